//! Authorization rules for letters and accounts.
//!
//! Every check is a pure function of the acting user and, where relevant,
//! the record's owner. Nothing is cached: the actor's role is loaded fresh
//! for each request, so a role change is honoured on the next call.

use serde::Serialize;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::models::UserRole;

/// Who may open a single letter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewPolicy {
    /// Any signed-in user. Used for incoming letters.
    AnyAuthenticated,
    /// The letter's owner or the privileged role. Used for outgoing letters.
    OwnerOrPrivileged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    View,
    DownloadAttachment,
    Create,
    Update,
    Delete,
    ManageDisposition,
    ManageWarning,
}

pub fn is_privileged(actor: &AuthenticatedUser) -> bool {
    actor.role == UserRole::Secretary
}

pub fn can_create(actor: &AuthenticatedUser) -> bool {
    is_privileged(actor)
}

pub fn can_update(actor: &AuthenticatedUser) -> bool {
    is_privileged(actor)
}

pub fn can_delete(actor: &AuthenticatedUser) -> bool {
    is_privileged(actor)
}

pub fn can_manage_disposition(actor: &AuthenticatedUser) -> bool {
    is_privileged(actor)
}

pub fn can_manage_warning(actor: &AuthenticatedUser) -> bool {
    is_privileged(actor)
}

pub fn can_manage_users(actor: &AuthenticatedUser) -> bool {
    is_privileged(actor)
}

pub fn can_view(actor: &AuthenticatedUser, policy: ViewPolicy, owner_id: Option<Uuid>) -> bool {
    match policy {
        ViewPolicy::AnyAuthenticated => true,
        ViewPolicy::OwnerOrPrivileged => {
            is_privileged(actor) || owner_id == Some(actor.user_id)
        }
    }
}

pub fn can_download_attachment(
    actor: &AuthenticatedUser,
    policy: ViewPolicy,
    owner_id: Option<Uuid>,
) -> bool {
    can_view(actor, policy, owner_id)
}

pub fn authorize(
    actor: &AuthenticatedUser,
    action: Action,
    policy: ViewPolicy,
    owner_id: Option<Uuid>,
) -> bool {
    match action {
        Action::View => can_view(actor, policy, owner_id),
        Action::DownloadAttachment => can_download_attachment(actor, policy, owner_id),
        Action::Create => can_create(actor),
        Action::Update => can_update(actor),
        Action::Delete => can_delete(actor),
        Action::ManageDisposition => can_manage_disposition(actor),
        Action::ManageWarning => can_manage_warning(actor),
    }
}

/// Fails with `403 not permitted` unless the action is allowed.
pub fn ensure(
    actor: &AuthenticatedUser,
    action: Action,
    policy: ViewPolicy,
    owner_id: Option<Uuid>,
) -> AppResult<()> {
    if authorize(actor, action, policy, owner_id) {
        Ok(())
    } else {
        tracing::debug!(
            user_id = %actor.user_id,
            action = ?action,
            "permission denied"
        );
        Err(AppError::forbidden())
    }
}

/// Owner filter applied to listings: `None` means every record.
pub fn listing_scope(actor: &AuthenticatedUser) -> Option<Uuid> {
    if is_privileged(actor) {
        None
    } else {
        Some(actor.user_id)
    }
}

/// Flags handed to the presentation layer alongside letters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LetterPermissions {
    pub can_create: bool,
    pub can_edit: bool,
    pub can_delete: bool,
    pub can_manage_disposition: bool,
    /// Only present where letters carry a warning flag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub can_manage_warning: Option<bool>,
}

impl LetterPermissions {
    pub fn for_actor(actor: &AuthenticatedUser) -> Self {
        Self {
            can_create: can_create(actor),
            can_edit: can_update(actor),
            can_delete: can_delete(actor),
            can_manage_disposition: can_manage_disposition(actor),
            can_manage_warning: None,
        }
    }

    pub fn with_warning(mut self, actor: &AuthenticatedUser) -> Self {
        self.can_manage_warning = Some(can_manage_warning(actor));
        self
    }
}
