use axum::{
    extract::{Path, Query, State},
    response::{Html, IntoResponse, Redirect, Response},
};
use minijinja::context;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};
use validator::Validate;

use crate::core::error::{AppError, Result};
use crate::core::extractor::AppForm;
use crate::features::files::dtos::{
    FileQueryParams, FlashQuery, MethodOverrideForm, UpdateFileDto, UploadForm,
};
use crate::features::files::services::StoreOutcome;
use crate::features::files::FilesState;
use crate::shared::flash::{with_flash, Alert, AlertAction, AlertStatus, Flash};

const DOWNLOAD_PREFIX: &str = "/download";

fn render(state: &FilesState, view: &str, ctx: impl Serialize) -> Result<Html<String>> {
    Ok(Html(state.views.render(view, ctx)?))
}

async fn take_flash(state: &FilesState, query: &FlashQuery) -> Option<Flash> {
    match query.flash {
        Some(id) => state.flashes.take(id).await,
        None => None,
    }
}

/// 303 to `path`, carrying `flash` to the next page
async fn redirect_with(state: &FilesState, path: &str, flash: Flash) -> Response {
    let id = state.flashes.push(flash).await;
    Redirect::to(&with_flash(path, id)).into_response()
}

/// File list
pub async fn index(
    State(state): State<FilesState>,
    Query(params): Query<FileQueryParams>,
    Query(flash): Query<FlashQuery>,
) -> Result<Html<String>> {
    let (files, total) = state.files.list_files(&params).await?;
    let flash = take_flash(&state, &flash).await;

    let page = params.page.max(1);
    let pages = params.pages(total);
    let previous = (page > 1).then(|| params.page_query(page.min(pages + 1) - 1));
    let next = (page < pages).then(|| params.page_query(page + 1));

    render(
        &state,
        "files/index.html",
        context! {
            files,
            total,
            page,
            pages,
            previous,
            next,
            filter => params,
            flash,
        },
    )
}

/// Upload form
pub async fn create(State(state): State<FilesState>) -> Result<Html<String>> {
    render(&state, "files/create.html", context! {})
}

/// Save an upload, run its handling script and record the results
pub async fn store(State(state): State<FilesState>, form: UploadForm) -> Result<Response> {
    form.validate()?;

    match state.uploads.store(form).await? {
        StoreOutcome::Saved {
            file,
            modifications,
        } => {
            debug!(
                "Upload {} stored with {} modification(s)",
                file.id,
                modifications.len()
            );
            let flash = Flash {
                status: Some("saved".to_string()),
                file: Some(json!(file)),
                ..Default::default()
            };
            Ok(redirect_with(&state, &format!("/files/{}/edit", file.id), flash).await)
        }
        StoreOutcome::NotSaved(info) => {
            let flash = Flash {
                alert: Some(Alert {
                    action: Some(AlertAction::Store),
                    status: AlertStatus::Code("fileNotSaved".to_string()),
                    id: None,
                    data: None,
                    file: Some(json!(info)),
                }),
                ..Default::default()
            };
            Ok(redirect_with(&state, "/files/upload-error", flash).await)
        }
    }
}

/// Landing page of an upload that could not be saved
pub async fn upload_error(
    State(state): State<FilesState>,
    Query(flash): Query<FlashQuery>,
) -> Result<Html<String>> {
    let flash = take_flash(&state, &flash).await;
    render(&state, "files/upload_error.html", context! { flash })
}

/// File details with its modifications
pub async fn show(
    State(state): State<FilesState>,
    Path(id): Path<i64>,
    Query(flash): Query<FlashQuery>,
) -> Result<Html<String>> {
    let detail = state.files.get_file_with_modifications(id).await?;
    let flash = take_flash(&state, &flash).await;

    render(
        &state,
        "files/show.html",
        context! {
            url => detail.file.url.clone(),
            file => detail.file,
            modifications => detail.modifications,
            flash,
        },
    )
}

/// Edit form
pub async fn edit(
    State(state): State<FilesState>,
    Path(id): Path<i64>,
    Query(flash): Query<FlashQuery>,
) -> Result<Html<String>> {
    let (file, modifications_count) = state.files.get_file(id).await?;
    let flash = take_flash(&state, &flash).await;

    render(
        &state,
        "files/edit.html",
        context! {
            url => file.url.clone(),
            file,
            download_prefix => DOWNLOAD_PREFIX,
            modifications_count,
            flash,
        },
    )
}

/// PUT/PATCH from the edit form
pub async fn update(
    State(state): State<FilesState>,
    Path(id): Path<i64>,
    AppForm(dto): AppForm<UpdateFileDto>,
) -> Result<Response> {
    apply_update(&state, id, dto).await
}

/// DELETE from the edit form
pub async fn destroy(State(state): State<FilesState>, Path(id): Path<i64>) -> Result<Response> {
    apply_destroy(&state, id).await
}

/// HTML forms can only POST; `_method` names the verb they mean
pub async fn method_override(
    State(state): State<FilesState>,
    Path(id): Path<i64>,
    AppForm(form): AppForm<MethodOverrideForm>,
) -> Result<Response> {
    match form.method.to_ascii_uppercase().as_str() {
        "PUT" | "PATCH" => apply_update(&state, id, form.fields).await,
        "DELETE" => apply_destroy(&state, id).await,
        other => Err(AppError::BadRequest(format!(
            "Unsupported form method '{}'",
            other
        ))),
    }
}

async fn apply_update(state: &FilesState, id: i64, dto: UpdateFileDto) -> Result<Response> {
    dto.validate()?;

    let updated = state.files.update_file(id, &dto.into_update()).await?;
    let flash = Flash {
        alert: Some(Alert {
            action: Some(AlertAction::Update),
            status: AlertStatus::Done(updated.is_some()),
            id: Some(id),
            data: updated.map(|file| json!(file)),
            file: None,
        }),
        ..Default::default()
    };

    Ok(redirect_with(state, &format!("/files/{}/edit", id), flash).await)
}

async fn apply_destroy(state: &FilesState, id: i64) -> Result<Response> {
    let deleted = state.files.delete_file_with_modifications(id).await?;
    let done = !deleted.is_empty();
    if done {
        info!("File {} deleted from the admin", id);
    }

    let target = if done {
        "/files".to_string()
    } else {
        format!("/files/{}/edit", id)
    };
    let flash = Flash {
        alert: Some(Alert {
            action: Some(AlertAction::Delete),
            status: AlertStatus::Done(done),
            id: Some(id),
            data: done.then(|| json!(deleted)),
            file: None,
        }),
        ..Default::default()
    };

    Ok(redirect_with(state, &target, flash).await)
}
