use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tracing::{error, warn};

use crate::{
    attachments,
    auth::AuthenticatedUser,
    error::{AppError, AppResult},
    letters::{
        LetterChanges, LetterDraft, LetterResponse, LetterService, LetterStore, ListQuery,
        OutgoingService, OutgoingStore, Page, ReportQuery, UploadedFile,
    },
    state::AppState,
};

/// Routes shared by both registers; mounted once per store.
pub fn router<S: LetterStore>() -> Router<AppState> {
    Router::new()
        .route("/", get(list_letters::<S>).post(create_letter::<S>))
        .route("/report", get(report_letters::<S>))
        .route(
            "/:id",
            get(show_letter::<S>)
                .put(update_letter::<S>)
                .delete(delete_letter::<S>),
        )
        .route("/:id/edit", get(edit_letter::<S>))
        .route("/:id/disposition", post(toggle_disposition::<S>))
        .route("/:id/attachment", get(download_attachment::<S>))
}

pub fn outgoing_router() -> Router<AppState> {
    router::<OutgoingStore>().route("/:id/warning", post(toggle_warning))
}

pub async fn list_letters<S: LetterStore>(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
    user: AuthenticatedUser,
) -> AppResult<Json<Page<LetterResponse>>> {
    let service = LetterService::<S>::new(state);
    Ok(Json(service.list(&user, query)?))
}

pub async fn report_letters<S: LetterStore>(
    State(state): State<AppState>,
    Query(query): Query<ReportQuery>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<LetterResponse>>> {
    let service = LetterService::<S>::new(state);
    Ok(Json(service.report(&user, query)?))
}

pub async fn create_letter<S: LetterStore>(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<LetterResponse>)> {
    let mut draft = LetterDraft::default();
    let mut file: Option<UploadedFile> = None;

    while let Some(field) = multipart.next_field().await.map_err(|err| {
        error!(error = %err, "invalid multipart data");
        AppError::bad_request(format!("invalid multipart data: {err}"))
    })? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        if name == "attachment" {
            let filename = field
                .file_name()
                .map(str::to_string)
                .unwrap_or_else(|| "attachment".to_string());
            let content_type = field.content_type().map(str::to_string);
            let data = field.bytes().await.map_err(|err| {
                warn!(error = %err, "failed to read attachment bytes");
                AppError::bad_request(format!("failed to read attachment: {err}"))
            })?;
            file = Some(UploadedFile {
                bytes: data.to_vec(),
                filename,
                content_type,
            });
            continue;
        }

        let slot = match name.as_str() {
            "reference_number" => &mut draft.reference_number,
            "document_date" => &mut draft.document_date,
            "sender" => &mut draft.sender,
            "recipient" => &mut draft.recipient,
            "subject" => &mut draft.subject,
            "origin_number" => &mut draft.origin_number,
            "origin_date" => &mut draft.origin_date,
            _ => continue,
        };
        let value = field.text().await.map_err(|err| {
            AppError::bad_request(format!("invalid value for {name}: {err}"))
        })?;
        *slot = Some(value);
    }

    let service = LetterService::<S>::new(state);
    let letter = service.create(&user, draft, file).await?;
    Ok((StatusCode::CREATED, Json(letter)))
}

pub async fn show_letter<S: LetterStore>(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    user: AuthenticatedUser,
) -> AppResult<Json<LetterResponse>> {
    let service = LetterService::<S>::new(state);
    Ok(Json(service.view(&user, id)?))
}

pub async fn edit_letter<S: LetterStore>(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    user: AuthenticatedUser,
) -> AppResult<Json<LetterResponse>> {
    let service = LetterService::<S>::new(state);
    Ok(Json(service.edit(&user, id)?))
}

pub async fn update_letter<S: LetterStore>(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    user: AuthenticatedUser,
    Json(changes): Json<LetterChanges>,
) -> AppResult<Json<LetterResponse>> {
    let service = LetterService::<S>::new(state);
    Ok(Json(service.update(&user, id, changes)?))
}

pub async fn delete_letter<S: LetterStore>(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    user: AuthenticatedUser,
) -> AppResult<StatusCode> {
    let service = LetterService::<S>::new(state);
    service.delete(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn toggle_disposition<S: LetterStore>(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    user: AuthenticatedUser,
) -> AppResult<Json<LetterResponse>> {
    let service = LetterService::<S>::new(state);
    Ok(Json(service.toggle_disposition(&user, id)?))
}

pub async fn toggle_warning(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    user: AuthenticatedUser,
) -> AppResult<Json<LetterResponse>> {
    let service = OutgoingService::new(state);
    Ok(Json(service.toggle_warning(&user, id)?))
}

pub async fn download_attachment<S: LetterStore>(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    user: AuthenticatedUser,
) -> AppResult<impl IntoResponse> {
    let service = LetterService::<S>::new(state);
    let download = service.download_attachment(&user, id).await?;

    let mut headers = HeaderMap::new();
    let content_type = HeaderValue::from_str(&download.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    headers.insert(header::CONTENT_TYPE, content_type);
    let disposition =
        HeaderValue::from_str(&attachments::attachment_content_disposition(&download.filename))
            .map_err(AppError::internal)?;
    headers.insert(header::CONTENT_DISPOSITION, disposition);

    Ok((headers, download.bytes))
}
