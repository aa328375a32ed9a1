use axum::{extract::State, Json};
use serde::Serialize;

use crate::{
    auth::AuthenticatedUser,
    error::AppResult,
    letters::{IncomingService, OutgoingService},
    permissions::LetterPermissions,
    state::AppState,
};

#[derive(Serialize)]
pub struct DashboardResponse {
    pub user: AuthenticatedUser,
    pub incoming_total: i64,
    pub incoming_unread: i64,
    pub outgoing_total: i64,
    pub permissions: LetterPermissions,
}

/// Counts are scoped exactly like the listings the user can open.
pub async fn summary(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<DashboardResponse>> {
    let incoming = IncomingService::new(state.clone());
    let outgoing = OutgoingService::new(state);

    Ok(Json(DashboardResponse {
        incoming_total: incoming.count(&user)?,
        incoming_unread: incoming.count_unread(&user)?,
        outgoing_total: outgoing.count(&user)?,
        permissions: LetterPermissions::for_actor(&user).with_warning(&user),
        user,
    }))
}
