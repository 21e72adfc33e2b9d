//! HTTP handlers for the `/transactions` surface (§6), the FastAPI layer
//! over the core intake/tracker/recovery components (C10-C12).

use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use futures::{StreamExt, TryStreamExt};
use uuid::Uuid;

use crate::{
    dto::{
        DuplicateFileView, ListUploadsQuery, ListUploadsView, ResumeAllView, SkippedUpload,
        SyncUploadView, TimeoutQuery, UploadAcceptedView, UploadView,
    },
    error::{ApiError, ApiResult},
    state::AppState,
};
use cnab_ingest_logic::{
    intake::{IntakeOutcome, UploadIntake},
    recovery::{resume_upload, SweepOutcome},
    IngestError,
};

const DEFAULT_PAGE_SIZE: u64 = 20;

pub async fn upload(
    state: web::Data<AppState>,
    mut payload: Multipart,
) -> ApiResult<HttpResponse> {
    let mut file_name = None;
    let mut bytes = Vec::new();

    while let Some(mut field) = payload.try_next().await.map_err(|err| {
        ApiError(IngestError::InvalidRequest {
            reason: format!("malformed multipart body: {err}"),
        })
    })? {
        if field.name() == Some("file") {
            file_name = field
                .content_disposition()
                .and_then(|cd| cd.get_filename())
                .map(ToString::to_string);
            while let Some(chunk) = field.next().await {
                let chunk = chunk.map_err(|err| {
                    ApiError(IngestError::InvalidRequest {
                        reason: format!("malformed multipart chunk: {err}"),
                    })
                })?;
                if bytes.len() as u64 + chunk.len() as u64 > state.intake_settings.max_file_size_bytes
                {
                    return Err(ApiError(IngestError::PayloadTooLarge {
                        size: bytes.len() as u64 + chunk.len() as u64,
                        limit: state.intake_settings.max_file_size_bytes,
                    }));
                }
                bytes.extend_from_slice(&chunk);
            }
        }
    }

    let file_name = file_name.ok_or_else(|| {
        ApiError(IngestError::InvalidRequest {
            reason: "multipart body is missing a `file` field".to_string(),
        })
    })?;

    let intake = UploadIntake {
        tracker: &state.tracker,
        object_store: &state.object_store,
        queue: &state.queue,
        settings: &state.intake_settings,
    };

    match intake.ingest(&file_name, bytes).await.map_err(ApiError)? {
        IntakeOutcome::Accepted { upload } => {
            if !state.settings.synchronous_processing {
                return Ok(HttpResponse::Accepted().json(UploadAcceptedView::Accepted {
                    upload: upload.into(),
                }));
            }

            let (processed, failed, skipped) = state
                .worker_pool
                .process_inline(upload.id, &upload.storage_path)
                .await
                .map_err(ApiError)?;
            let upload = state
                .tracker
                .get(upload.id)
                .await
                .map_err(ApiError)?
                .ok_or(ApiError(IngestError::NotFound { upload_id: upload.id }))?;

            if failed > 0 {
                return Err(ApiError(IngestError::UnprocessableContent {
                    failed_line_count: failed as u64,
                }));
            }

            Ok(HttpResponse::Ok().json(SyncUploadView {
                upload: upload.into(),
                transaction_count: processed,
                failed_line_count: failed,
                skipped_line_count: skipped,
            }))
        }
        IntakeOutcome::Duplicate { existing_upload_id } => Ok(HttpResponse::Conflict().json(
            DuplicateFileView { existing_upload_id },
        )),
    }
}

pub async fn list_uploads(
    state: web::Data<AppState>,
    query: web::Query<ListUploadsQuery>,
) -> ApiResult<HttpResponse> {
    let page = query.page.unwrap_or(1).max(1) - 1;
    let page_size = query.page_size.unwrap_or(DEFAULT_PAGE_SIZE).max(1);

    let (items, total_items) = state
        .tracker
        .list(page, page_size, query.status)
        .await
        .map_err(ApiError)?;
    let total_pages = total_items.div_ceil(page_size);

    Ok(HttpResponse::Ok().json(ListUploadsView {
        items: items.into_iter().map(UploadView::from).collect(),
        page: page + 1,
        page_size,
        total_items,
        total_pages,
    }))
}

pub async fn get_upload(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> ApiResult<HttpResponse> {
    let upload_id = path.into_inner();
    let upload = state
        .tracker
        .get(upload_id)
        .await
        .map_err(ApiError)?
        .ok_or(ApiError(IngestError::NotFound { upload_id }))?;
    Ok(HttpResponse::Ok().json(UploadView::from(upload)))
}

pub async fn list_incomplete_uploads(
    state: web::Data<AppState>,
    query: web::Query<TimeoutQuery>,
) -> ApiResult<HttpResponse> {
    let timeout_minutes = query
        .timeout_minutes
        .unwrap_or(state.settings.stuck_upload_timeout_minutes as i64);
    let uploads = state
        .tracker
        .find_incomplete_uploads(timeout_minutes)
        .await
        .map_err(ApiError)?;
    let views: Vec<UploadView> = uploads.into_iter().map(UploadView::from).collect();
    Ok(HttpResponse::Ok().json(views))
}

pub async fn resume_one(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> ApiResult<HttpResponse> {
    let upload_id = path.into_inner();
    resume_upload(&state.tracker, &state.queue, upload_id)
        .await
        .map_err(ApiError)?;
    Ok(HttpResponse::Ok().finish())
}

pub async fn resume_all(
    state: web::Data<AppState>,
    query: web::Query<TimeoutQuery>,
) -> ApiResult<HttpResponse> {
    let timeout_minutes = query
        .timeout_minutes
        .unwrap_or(state.settings.stuck_upload_timeout_minutes as i64);
    let outcomes = state
        .sweeper
        .sweep(timeout_minutes)
        .await
        .map_err(ApiError)?;

    let mut enqueued = Vec::new();
    let mut skipped = Vec::new();
    for (upload_id, outcome) in outcomes {
        match outcome {
            SweepOutcome::Enqueued => enqueued.push(upload_id),
            SweepOutcome::SkippedLocked => skipped.push(SkippedUpload {
                upload_id,
                reason: "locked",
            }),
            SweepOutcome::SkippedNoStoragePath => skipped.push(SkippedUpload {
                upload_id,
                reason: "no_storage_path",
            }),
            SweepOutcome::SkippedRecentCheckpoint => skipped.push(SkippedUpload {
                upload_id,
                reason: "recent_checkpoint",
            }),
        }
    }

    Ok(HttpResponse::Ok().json(ResumeAllView { enqueued, skipped }))
}

/// Administrative truncation of the transaction table (§6). Unguarded by
/// design — the endpoint exists for test/staging resets, per the
/// specification's Open Questions resolution recorded in the design ledger.
pub async fn clear_transactions(state: web::Data<AppState>) -> ApiResult<HttpResponse> {
    state.transaction_store.clear_all().await.map_err(ApiError)?;
    Ok(HttpResponse::NoContent().finish())
}
