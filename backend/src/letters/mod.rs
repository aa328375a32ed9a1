//! Correspondence register: validation, listing and the record lifecycle
//! shared by incoming and outgoing letters.
//!
//! Variant-specific SQL lives behind [`LetterStore`]; [`LetterService`]
//! layers permissions and the attachment saga on top of it.

pub mod incoming;
pub mod outgoing;

use std::collections::HashMap;

use chrono::NaiveDate;
use diesel::{prelude::*, PgConnection};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    attachments::{self, AttachmentError},
    auth::AuthenticatedUser,
    error::{AppError, AppResult, FieldErrors},
    models::Attachment,
    permissions::{self, Action, LetterPermissions, ViewPolicy},
    schema::users,
    state::AppState,
    utils::time::to_iso,
};

pub use incoming::IncomingStore;
pub use outgoing::OutgoingStore;

pub const MAX_PAGE_SIZE: i64 = 100;
const MAX_TEXT_CHARS: usize = 255;
const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LetterKind {
    Incoming,
    Outgoing,
}

impl LetterKind {
    /// Flag set for the letter list; outgoing letters also expose the
    /// warning toggle.
    pub fn permissions_for(self, actor: &AuthenticatedUser) -> LetterPermissions {
        let flags = LetterPermissions::for_actor(actor);
        match self {
            LetterKind::Incoming => flags,
            LetterKind::Outgoing => flags.with_warning(actor),
        }
    }

    pub fn view_policy(self) -> ViewPolicy {
        match self {
            LetterKind::Incoming => ViewPolicy::AnyAuthenticated,
            LetterKind::Outgoing => ViewPolicy::OwnerOrPrivileged,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LetterKind::Incoming => "incoming",
            LetterKind::Outgoing => "outgoing",
        }
    }
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).ok()
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(|s| s.trim()).filter(|s| !s.is_empty())
}

fn required_text(errors: &mut FieldErrors, field: &str, value: Option<&String>) -> Option<String> {
    match non_empty(value) {
        None => {
            errors.insert(field.to_string(), format!("{field} is required"));
            None
        }
        Some(text) if text.chars().count() > MAX_TEXT_CHARS => {
            errors.insert(
                field.to_string(),
                format!("{field} must not exceed {MAX_TEXT_CHARS} characters"),
            );
            None
        }
        Some(text) => Some(text.to_string()),
    }
}

fn optional_date(errors: &mut FieldErrors, field: &str, value: Option<&String>) -> Option<NaiveDate> {
    let raw = non_empty(value)?;
    let parsed = parse_date(raw);
    if parsed.is_none() {
        errors.insert(
            field.to_string(),
            format!("{field} must be a valid date (YYYY-MM-DD)"),
        );
    }
    parsed
}

fn required_date(errors: &mut FieldErrors, field: &str, value: Option<&String>) -> Option<NaiveDate> {
    if non_empty(value).is_none() {
        errors.insert(field.to_string(), format!("{field} is required"));
        return None;
    }
    optional_date(errors, field, value)
}

/// Raw create form, as submitted.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct LetterDraft {
    pub reference_number: Option<String>,
    pub document_date: Option<String>,
    pub sender: Option<String>,
    pub recipient: Option<String>,
    pub subject: Option<String>,
    pub origin_number: Option<String>,
    pub origin_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidDraft {
    pub reference_number: String,
    pub document_date: NaiveDate,
    pub sender: String,
    pub recipient: String,
    pub subject: String,
    pub origin_number: String,
    pub origin_date: NaiveDate,
}

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub content_type: Option<String>,
}

impl LetterDraft {
    /// Every problem is collected, the file included, before anything is
    /// written.
    pub fn validate(
        &self,
        file: Option<&UploadedFile>,
        max_attachment_bytes: usize,
    ) -> Result<ValidDraft, FieldErrors> {
        let mut errors = FieldErrors::new();

        let reference_number =
            required_text(&mut errors, "reference_number", self.reference_number.as_ref());
        let document_date = required_date(&mut errors, "document_date", self.document_date.as_ref());
        let sender = required_text(&mut errors, "sender", self.sender.as_ref());
        let recipient = required_text(&mut errors, "recipient", self.recipient.as_ref());
        let subject = required_text(&mut errors, "subject", self.subject.as_ref());
        let origin_date = optional_date(&mut errors, "origin_date", self.origin_date.as_ref());
        let origin_number = non_empty(self.origin_number.as_ref()).map(str::to_string);

        match file {
            None => {
                errors.insert("attachment".into(), "attachment is required".into());
            }
            Some(file) if file.bytes.is_empty() => {
                errors.insert("attachment".into(), "attachment must not be empty".into());
            }
            Some(file) if file.bytes.len() > max_attachment_bytes => {
                errors.insert(
                    "attachment".into(),
                    format!("attachment must not exceed {max_attachment_bytes} bytes"),
                );
            }
            Some(_) => {}
        }

        match (reference_number, document_date, sender, recipient, subject) {
            (Some(reference_number), Some(document_date), Some(sender), Some(recipient), Some(subject))
                if errors.is_empty() =>
            {
                Ok(ValidDraft {
                    origin_number: origin_number.unwrap_or_else(|| reference_number.clone()),
                    origin_date: origin_date.unwrap_or(document_date),
                    reference_number,
                    document_date,
                    sender,
                    recipient,
                    subject,
                })
            }
            _ => Err(errors),
        }
    }
}

/// Editable fields. Everything else on a letter is fixed after creation.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct LetterChanges {
    pub document_date: Option<String>,
    pub sender: Option<String>,
    pub recipient: Option<String>,
    pub subject: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidChanges {
    pub document_date: NaiveDate,
    pub sender: String,
    pub recipient: String,
    pub subject: String,
}

impl LetterChanges {
    pub fn validate(&self) -> Result<ValidChanges, FieldErrors> {
        let mut errors = FieldErrors::new();
        let document_date = required_date(&mut errors, "document_date", self.document_date.as_ref());
        let sender = required_text(&mut errors, "sender", self.sender.as_ref());
        let recipient = required_text(&mut errors, "recipient", self.recipient.as_ref());
        let subject = required_text(&mut errors, "subject", self.subject.as_ref());

        match (document_date, sender, recipient, subject) {
            (Some(document_date), Some(sender), Some(recipient), Some(subject)) => {
                Ok(ValidChanges {
                    document_date,
                    sender,
                    recipient,
                    subject,
                })
            }
            _ => Err(errors),
        }
    }
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct ListQuery {
    pub search: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// A validated listing request. `owner` is the visibility scope, not a
/// user-supplied filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListFilter {
    pub search: Option<String>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub owner: Option<Uuid>,
    pub page: i64,
    pub per_page: i64,
}

impl ListQuery {
    pub fn into_filter(
        self,
        default_page_size: i64,
        owner: Option<Uuid>,
    ) -> Result<ListFilter, FieldErrors> {
        let mut errors = FieldErrors::new();
        let start = optional_date(&mut errors, "start_date", self.start_date.as_ref());
        let end = optional_date(&mut errors, "end_date", self.end_date.as_ref());
        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(ListFilter {
            search: non_empty(self.search.as_ref()).map(str::to_string),
            start,
            end,
            owner,
            page: self.page.unwrap_or(1).max(1),
            per_page: self
                .per_page
                .unwrap_or(default_page_size)
                .clamp(1, MAX_PAGE_SIZE),
        })
    }
}

impl ListFilter {
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.per_page)
    }

    /// `ILIKE` pattern with the user's wildcards escaped.
    pub fn search_pattern(&self) -> Option<String> {
        self.search.as_ref().map(|term| {
            let mut escaped = String::with_capacity(term.len() + 2);
            escaped.push('%');
            for ch in term.chars() {
                if matches!(ch, '%' | '_' | '\\') {
                    escaped.push('\\');
                }
                escaped.push(ch);
            }
            escaped.push('%');
            escaped
        })
    }
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct ReportQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl ReportQuery {
    pub fn validate(&self) -> Result<DateRange, FieldErrors> {
        let mut errors = FieldErrors::new();
        let start = required_date(&mut errors, "start_date", self.start_date.as_ref());
        let end = required_date(&mut errors, "end_date", self.end_date.as_ref());
        match (start, end) {
            (Some(start), Some(end)) if start <= end => Ok(DateRange { start, end }),
            (Some(_), Some(_)) => {
                errors.insert(
                    "end_date".into(),
                    "end_date must not be before start_date".into(),
                );
                Err(errors)
            }
            _ => Err(errors),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub page: i64,
    pub per_page: i64,
    pub total: i64,
    pub last_page: i64,
    pub permissions: LetterPermissions,
}

pub fn last_page(total: i64, per_page: i64) -> i64 {
    if total <= 0 || per_page <= 0 {
        1
    } else {
        (total + per_page - 1) / per_page
    }
}

#[derive(Debug, Clone, Serialize, Queryable)]
pub struct OwnerSummary {
    pub id: Uuid,
    pub username: String,
    pub full_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AttachmentSummary {
    pub filename: String,
    pub size_bytes: i64,
    pub content_type: Option<String>,
    pub checksum: String,
    pub uploaded_at: String,
}

impl From<&Attachment> for AttachmentSummary {
    fn from(attachment: &Attachment) -> Self {
        Self {
            filename: attachment.filename.clone(),
            size_bytes: attachment.size_bytes,
            content_type: attachment.content_type.clone(),
            checksum: attachment.checksum.clone(),
            uploaded_at: to_iso(attachment.created_at),
        }
    }
}

/// Wire shape for both variants; fields a variant lacks are omitted.
#[derive(Debug, Serialize)]
pub struct LetterResponse {
    pub id: i64,
    pub kind: LetterKind,
    pub reference_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_number: Option<String>,
    pub document_date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_date: Option<NaiveDate>,
    pub sender: String,
    pub recipient: String,
    pub subject: String,
    pub owner_id: Option<Uuid>,
    pub owner: Option<OwnerSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_read: Option<bool>,
    pub disposed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<bool>,
    pub attachment: Option<AttachmentSummary>,
    pub registered_on: NaiveDate,
    pub created_at: String,
    pub updated_at: String,
}

pub trait LetterRecord: Send + Sized + 'static {
    fn id(&self) -> i64;
    fn owner_id(&self) -> Option<Uuid>;
    fn attachment_token(&self) -> Option<&str>;
    fn into_response(
        self,
        attachment: Option<&Attachment>,
        owner: Option<OwnerSummary>,
    ) -> LetterResponse;
}

/// Row access for one letter table. All methods run on the caller's
/// connection so they compose inside transactions.
pub trait LetterStore: Default + Send + Sync + 'static {
    type Record: LetterRecord;

    const KIND: LetterKind;

    fn find(&self, conn: &mut PgConnection, id: i64) -> QueryResult<Option<Self::Record>>;

    /// One page, newest first, plus the total matching the filter.
    fn list(
        &self,
        conn: &mut PgConnection,
        filter: &ListFilter,
    ) -> QueryResult<(Vec<Self::Record>, i64)>;

    fn report(
        &self,
        conn: &mut PgConnection,
        owner: Option<Uuid>,
        range: DateRange,
    ) -> QueryResult<Vec<Self::Record>>;

    fn count(&self, conn: &mut PgConnection, owner: Option<Uuid>) -> QueryResult<i64>;

    fn insert(
        &self,
        conn: &mut PgConnection,
        draft: &ValidDraft,
        owner_id: Uuid,
        token: &str,
    ) -> QueryResult<Self::Record>;

    fn update(
        &self,
        conn: &mut PgConnection,
        id: i64,
        changes: &ValidChanges,
    ) -> QueryResult<Option<Self::Record>>;

    fn toggle_disposition(
        &self,
        conn: &mut PgConnection,
        id: i64,
    ) -> QueryResult<Option<Self::Record>>;

    fn delete(&self, conn: &mut PgConnection, id: i64) -> QueryResult<usize>;

    /// Flags the first view by the owner. Returns the updated row only when
    /// the flag actually changed; variants without read tracking never do.
    fn mark_read(&self, _conn: &mut PgConnection, _id: i64) -> QueryResult<Option<Self::Record>> {
        Ok(None)
    }
}

pub struct Download {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub content_type: String,
}

pub struct LetterService<S> {
    state: AppState,
    store: S,
}

pub type IncomingService = LetterService<IncomingStore>;
pub type OutgoingService = LetterService<OutgoingStore>;

fn letter_not_found() -> AppError {
    AppError::not_found_with("letter not found")
}

impl<S: LetterStore> LetterService<S> {
    pub fn new(state: AppState) -> Self {
        Self {
            state,
            store: S::default(),
        }
    }

    fn policy() -> ViewPolicy {
        S::KIND.view_policy()
    }

    fn ensure(&self, actor: &AuthenticatedUser, action: Action, owner: Option<Uuid>) -> AppResult<()> {
        permissions::ensure(actor, action, Self::policy(), owner)
    }

    pub fn list(&self, actor: &AuthenticatedUser, query: ListQuery) -> AppResult<Page<LetterResponse>> {
        let filter = query
            .into_filter(
                self.state.config.default_page_size,
                permissions::listing_scope(actor),
            )
            .map_err(AppError::validation)?;

        let mut conn = self.state.db()?;
        let (records, total) = self.store.list(&mut conn, &filter)?;
        let data = decorate(&mut conn, records)?;

        Ok(Page {
            data,
            page: filter.page,
            per_page: filter.per_page,
            total,
            last_page: last_page(total, filter.per_page),
            permissions: S::KIND.permissions_for(actor),
        })
    }

    pub async fn create(
        &self,
        actor: &AuthenticatedUser,
        draft: LetterDraft,
        file: Option<UploadedFile>,
    ) -> AppResult<LetterResponse> {
        self.ensure(actor, Action::Create, None)?;

        let valid = draft
            .validate(file.as_ref(), self.state.config.max_attachment_bytes)
            .map_err(AppError::validation)?;
        let file = file.ok_or_else(|| AppError::bad_request("attachment is required"))?;

        let token = attachments::generate_token();
        let stored = attachments::save(
            self.state.storage.as_ref(),
            file.bytes,
            &file.filename,
            file.content_type,
        )
        .await?;

        let mut conn = match self.state.db() {
            Ok(conn) => conn,
            Err(err) => {
                attachments::discard(self.state.storage.as_ref(), &stored).await;
                return Err(err);
            }
        };

        let outcome = conn.transaction::<_, diesel::result::Error, _>(|conn| {
            let attachment = attachments::record(conn, &token, &stored)?;
            let record = self.store.insert(conn, &valid, actor.user_id, &token)?;
            Ok((record, attachment))
        });

        let (record, attachment) = match outcome {
            Ok(pair) => pair,
            Err(err) => {
                error!(
                    kind = S::KIND.as_str(),
                    error = %err,
                    "letter insert failed; discarding stored attachment"
                );
                attachments::discard(self.state.storage.as_ref(), &stored).await;
                return Err(AppError::from(err));
            }
        };

        info!(
            kind = S::KIND.as_str(),
            letter_id = record.id(),
            user_id = %actor.user_id,
            filename = %attachment.filename,
            size_bytes = attachment.size_bytes,
            "letter registered"
        );

        let owner = load_owner(&mut conn, record.owner_id())?;
        Ok(record.into_response(Some(&attachment), owner))
    }

    pub fn view(&self, actor: &AuthenticatedUser, id: i64) -> AppResult<LetterResponse> {
        let mut conn = self.state.db()?;
        let mut record = self.store.find(&mut conn, id)?.ok_or_else(letter_not_found)?;
        self.ensure(actor, Action::View, record.owner_id())?;

        if record.owner_id() == Some(actor.user_id) {
            if let Some(updated) = self.store.mark_read(&mut conn, id)? {
                info!(kind = S::KIND.as_str(), letter_id = id, "letter marked as read");
                record = updated;
            }
        }

        respond(&mut conn, record)
    }

    /// Loads a letter for editing. Unlike `view` this never touches the
    /// read flag.
    pub fn edit(&self, actor: &AuthenticatedUser, id: i64) -> AppResult<LetterResponse> {
        self.ensure(actor, Action::Update, None)?;
        let mut conn = self.state.db()?;
        let record = self.store.find(&mut conn, id)?.ok_or_else(letter_not_found)?;
        respond(&mut conn, record)
    }

    pub fn update(
        &self,
        actor: &AuthenticatedUser,
        id: i64,
        changes: LetterChanges,
    ) -> AppResult<LetterResponse> {
        self.ensure(actor, Action::Update, None)?;
        let valid = changes.validate().map_err(AppError::validation)?;

        let mut conn = self.state.db()?;
        let record = self
            .store
            .update(&mut conn, id, &valid)?
            .ok_or_else(letter_not_found)?;
        info!(kind = S::KIND.as_str(), letter_id = id, "letter updated");
        respond(&mut conn, record)
    }

    /// Attachments go first: a failure there leaves the letter in place
    /// with its token still valid.
    pub async fn delete(&self, actor: &AuthenticatedUser, id: i64) -> AppResult<()> {
        self.ensure(actor, Action::Delete, None)?;

        let mut conn = self.state.db()?;
        let record = self.store.find(&mut conn, id)?.ok_or_else(letter_not_found)?;

        let mut purged = 0;
        if let Some(token) = record.attachment_token() {
            purged = attachments::delete(&mut conn, self.state.storage.as_ref(), token).await?;
        }

        let deleted = self.store.delete(&mut conn, id)?;
        if deleted == 0 {
            return Err(letter_not_found());
        }

        info!(
            kind = S::KIND.as_str(),
            letter_id = id,
            attachments = purged,
            "letter deleted"
        );
        Ok(())
    }

    pub fn toggle_disposition(&self, actor: &AuthenticatedUser, id: i64) -> AppResult<LetterResponse> {
        self.ensure(actor, Action::ManageDisposition, None)?;
        let mut conn = self.state.db()?;
        let record = self
            .store
            .toggle_disposition(&mut conn, id)?
            .ok_or_else(letter_not_found)?;
        info!(kind = S::KIND.as_str(), letter_id = id, "disposition toggled");
        respond(&mut conn, record)
    }

    pub async fn download_attachment(&self, actor: &AuthenticatedUser, id: i64) -> AppResult<Download> {
        let mut conn = self.state.db()?;
        let record = self.store.find(&mut conn, id)?.ok_or_else(letter_not_found)?;
        self.ensure(actor, Action::DownloadAttachment, record.owner_id())?;

        let token = record.attachment_token().ok_or(AttachmentError::NoToken)?;
        let attachment = attachments::fetch(&mut conn, token)?.ok_or(AttachmentError::Missing)?;
        drop(conn);

        let bytes = attachments::read(self.state.storage.as_ref(), &attachment).await?;
        Ok(Download {
            content_type: attachments::content_type_for(&attachment),
            filename: attachment.filename,
            bytes,
        })
    }

    /// Every visible letter dated within the range, oldest first.
    pub fn report(&self, actor: &AuthenticatedUser, query: ReportQuery) -> AppResult<Vec<LetterResponse>> {
        let range = query.validate().map_err(AppError::validation)?;
        let mut conn = self.state.db()?;
        let records = self
            .store
            .report(&mut conn, permissions::listing_scope(actor), range)?;
        decorate(&mut conn, records)
    }

    pub fn count(&self, actor: &AuthenticatedUser) -> AppResult<i64> {
        let mut conn = self.state.db()?;
        Ok(self
            .store
            .count(&mut conn, permissions::listing_scope(actor))?)
    }
}

impl LetterService<IncomingStore> {
    pub fn count_unread(&self, actor: &AuthenticatedUser) -> AppResult<i64> {
        let mut conn = self.state.db()?;
        Ok(self
            .store
            .count_unread(&mut conn, permissions::listing_scope(actor))?)
    }
}

impl LetterService<OutgoingStore> {
    pub fn toggle_warning(&self, actor: &AuthenticatedUser, id: i64) -> AppResult<LetterResponse> {
        self.ensure(actor, Action::ManageWarning, None)?;
        let mut conn = self.state.db()?;
        let record = self
            .store
            .toggle_warning(&mut conn, id)?
            .ok_or_else(letter_not_found)?;
        info!(kind = "outgoing", letter_id = id, "warning toggled");
        respond(&mut conn, record)
    }
}

fn load_owner(conn: &mut PgConnection, owner_id: Option<Uuid>) -> AppResult<Option<OwnerSummary>> {
    let Some(owner_id) = owner_id else {
        return Ok(None);
    };
    Ok(users::table
        .find(owner_id)
        .select((users::id, users::username, users::full_name))
        .first::<OwnerSummary>(conn)
        .optional()?)
}

fn respond<R: LetterRecord>(conn: &mut PgConnection, record: R) -> AppResult<LetterResponse> {
    let attachment = match record.attachment_token() {
        Some(token) => attachments::fetch(conn, token)?,
        None => None,
    };
    let owner = load_owner(conn, record.owner_id())?;
    Ok(record.into_response(attachment.as_ref(), owner))
}

/// Attaches owner and attachment summaries to a batch of rows.
fn decorate<R: LetterRecord>(conn: &mut PgConnection, records: Vec<R>) -> AppResult<Vec<LetterResponse>> {
    let tokens: Vec<String> = records
        .iter()
        .filter_map(|record| record.attachment_token().map(str::to_string))
        .collect();
    let attachments_by_token = attachments::fetch_many(conn, &tokens)?;

    let mut owner_ids: Vec<Uuid> = records.iter().filter_map(|record| record.owner_id()).collect();
    owner_ids.sort_unstable();
    owner_ids.dedup();
    let owners: HashMap<Uuid, OwnerSummary> = if owner_ids.is_empty() {
        HashMap::new()
    } else {
        users::table
            .filter(users::id.eq_any(&owner_ids))
            .select((users::id, users::username, users::full_name))
            .load::<OwnerSummary>(conn)?
            .into_iter()
            .map(|owner| (owner.id, owner))
            .collect()
    };

    Ok(records
        .into_iter()
        .map(|record| {
            let attachment = record
                .attachment_token()
                .and_then(|token| attachments_by_token.get(token));
            let owner = record.owner_id().and_then(|id| owners.get(&id).cloned());
            record.into_response(attachment, owner)
        })
        .collect())
}
