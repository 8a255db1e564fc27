use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use validator::Validate;

use crate::core::error::{AppError, Result};
use crate::core::extractor::AppJson;
use crate::features::files::dtos::{
    FileDetailDto, FileDto, FileQueryParams, UpdateFileDto, UploadFileDto, UploadForm,
};
use crate::features::files::services::StoreOutcome;
use crate::features::files::FilesState;
use crate::shared::types::{ApiResponse, Meta};

/// List original files
///
/// Modifications are never listed; fetch a file to see them.
#[utoipa::path(
    get,
    path = "/api/files",
    tag = "files",
    params(FileQueryParams),
    responses(
        (status = 200, description = "Page of files", body = ApiResponse<Vec<FileDto>>)
    ),
    security(
        ("basic_auth" = [])
    )
)]
pub async fn list_files(
    State(state): State<FilesState>,
    Query(params): Query<FileQueryParams>,
) -> Result<Json<ApiResponse<Vec<FileDto>>>> {
    let (files, total) = state.files.list_files(&params).await?;
    Ok(Json(ApiResponse::success(
        Some(files),
        None,
        Some(Meta { total }),
    )))
}

/// Upload a file
///
/// The file is saved under a generated name, then processed by the
/// configured handling script. Every file the script produces is recorded
/// as a modification of the upload.
#[utoipa::path(
    post,
    path = "/api/files",
    tag = "files",
    request_body(
        content = UploadFileDto,
        content_type = "multipart/form-data",
        description = "File with its title, publishing fields and handler parameters",
    ),
    responses(
        (status = 201, description = "File stored", body = ApiResponse<FileDetailDto>),
        (status = 400, description = "Invalid form or handler parameters"),
        (status = 413, description = "File too large"),
        (status = 422, description = "The file could not be written to storage")
    ),
    security(
        ("basic_auth" = [])
    )
)]
pub async fn upload_file(
    State(state): State<FilesState>,
    form: UploadForm,
) -> Result<(StatusCode, Json<ApiResponse<FileDetailDto>>)> {
    form.validate()?;

    match state.uploads.store(form).await? {
        StoreOutcome::Saved {
            file,
            modifications,
        } => Ok((
            StatusCode::CREATED,
            Json(ApiResponse::success(
                Some(state.files.detail(file, modifications)),
                Some("File uploaded successfully".to_string()),
                None,
            )),
        )),
        StoreOutcome::NotSaved(info) => Err(AppError::Unprocessable(format!(
            "File '{}' could not be saved",
            info.filename
        ))),
    }
}

/// Get a file with its modifications
#[utoipa::path(
    get,
    path = "/api/files/{id}",
    tag = "files",
    params(
        ("id" = i64, Path, description = "File ID")
    ),
    responses(
        (status = 200, description = "File found", body = ApiResponse<FileDetailDto>),
        (status = 404, description = "File not found")
    ),
    security(
        ("basic_auth" = [])
    )
)]
pub async fn get_file(
    State(state): State<FilesState>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<FileDetailDto>>> {
    let detail = state.files.get_file_with_modifications(id).await?;
    Ok(Json(ApiResponse::success(Some(detail), None, None)))
}

/// Update title, description and publishing of a file
#[utoipa::path(
    patch,
    path = "/api/files/{id}",
    tag = "files",
    params(
        ("id" = i64, Path, description = "File ID")
    ),
    request_body = UpdateFileDto,
    responses(
        (status = 200, description = "File updated", body = ApiResponse<FileDto>),
        (status = 400, description = "Validation error"),
        (status = 404, description = "File not found")
    ),
    security(
        ("basic_auth" = [])
    )
)]
pub async fn update_file(
    State(state): State<FilesState>,
    Path(id): Path<i64>,
    AppJson(dto): AppJson<UpdateFileDto>,
) -> Result<Json<ApiResponse<FileDto>>> {
    dto.validate()?;

    let file = state
        .files
        .update_file(id, &dto.into_update())
        .await?
        .ok_or_else(|| AppError::NotFound(format!("File {} not found", id)))?;

    Ok(Json(ApiResponse::success(
        Some(file),
        Some("File updated successfully".to_string()),
        None,
    )))
}

/// Delete a file, its modifications and their stored bytes
#[utoipa::path(
    delete,
    path = "/api/files/{id}",
    tag = "files",
    params(
        ("id" = i64, Path, description = "File ID")
    ),
    responses(
        (status = 200, description = "Deleted records", body = ApiResponse<Vec<FileDto>>),
        (status = 404, description = "File not found")
    ),
    security(
        ("basic_auth" = [])
    )
)]
pub async fn delete_file(
    State(state): State<FilesState>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<Vec<FileDto>>>> {
    let deleted = state.files.delete_file_with_modifications(id).await?;
    if deleted.is_empty() {
        return Err(AppError::NotFound(format!("File {} not found", id)));
    }

    let total = deleted.len() as i64;
    Ok(Json(ApiResponse::success(
        Some(deleted),
        Some("File deleted successfully".to_string()),
        Some(Meta { total }),
    )))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use axum_test::multipart::{MultipartForm, Part};
    use axum_test::TestServer;
    use serde_json::{json, Value};

    use crate::shared::test_helpers::test_app;

    fn upload(filename: &str, mime: &str, data: &[u8]) -> MultipartForm {
        MultipartForm::new().add_text("title", "").add_part(
            "file",
            Part::bytes(data.to_vec())
                .file_name(filename)
                .mime_type(mime),
        )
    }

    #[tokio::test]
    async fn test_upload_returns_created_detail() {
        let app = test_app();
        let server = TestServer::new(app.router).unwrap();

        let form = upload("photo.jpg", "image/jpeg", b"not really a jpeg")
            .add_text("description", "Team photo")
            .add_text("published", "1")
            .add_text("slug", "team-photo");
        let response = server.post("/api/files").multipart(form).await;

        response.assert_status(StatusCode::CREATED);
        let body: Value = response.json();
        let file = &body["data"]["file"];
        assert_eq!(file["title"], "photo");
        assert_eq!(file["mime"], "image/jpeg");
        assert_eq!(file["extension"], "jpg");
        assert_eq!(file["size"], 17);
        assert_eq!(file["published"], true);
        assert_eq!(file["slug"], "team-photo");
        assert_eq!(file["url"], "/storage/upload-1.jpg");
        assert_eq!(file["options"]["checksum"]["algorithm"], "sha256");
        assert_eq!(body["data"]["modifications"], json!([]));
    }

    #[tokio::test]
    async fn test_upload_rejects_unknown_handler_parameter() {
        let app = test_app();
        let server = TestServer::new(app.router).unwrap();

        let form = upload("notes.txt", "text/plain", b"hello")
            .add_text("handler_parameters[compress][speed]", "fast");
        let response = server.post("/api/files").multipart(form).await;

        response.assert_status(StatusCode::BAD_REQUEST);
        assert!(app.repository.all().is_empty());
        assert!(!app.storage_dir.path().join("public/upload-1.txt").exists());
    }

    #[tokio::test]
    async fn test_upload_collision_is_unprocessable() {
        let app = test_app();
        std::fs::write(app.storage_dir.path().join("public/upload-1.txt"), b"taken").unwrap();
        let server = TestServer::new(app.router).unwrap();

        let response = server
            .post("/api/files")
            .multipart(upload("notes.txt", "text/plain", b"hello"))
            .await;

        response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
        let body: Value = response.json();
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_list_get_update_delete() {
        let app = test_app();
        let server = TestServer::new(app.router).unwrap();
        server
            .post("/api/files")
            .multipart(upload("notes.txt", "text/plain", b"hello"))
            .await
            .assert_status(StatusCode::CREATED);

        let list: Value = server.get("/api/files").await.json();
        assert_eq!(list["meta"]["total"], 1);
        assert_eq!(list["data"][0]["title"], "notes");

        let detail: Value = server.get("/api/files/1").await.json();
        assert_eq!(detail["data"]["modifications"][0]["title"], "notes [1]");
        assert_eq!(detail["data"]["modifications"][0]["parent_id"], 1);

        let response = server
            .patch("/api/files/1")
            .json(&json!({"title": "Renamed", "description": "Plain text"}))
            .await;
        response.assert_status_ok();
        let updated: Value = response.json();
        assert_eq!(updated["data"]["title"], "Renamed");
        assert_eq!(updated["data"]["description"], "Plain text");

        let deleted: Value = server.delete("/api/files/1").await.json();
        assert_eq!(deleted["meta"]["total"], 2);

        server.get("/api/files/1").await.assert_status_not_found();
        server.delete("/api/files/1").await.assert_status_not_found();
    }

    #[tokio::test]
    async fn test_update_ignores_storage_fields() {
        let app = test_app();
        let server = TestServer::new(app.router).unwrap();
        server
            .post("/api/files")
            .multipart(upload("notes.txt", "text/plain", b"hello"))
            .await
            .assert_status(StatusCode::CREATED);

        let response = server
            .patch("/api/files/1")
            .json(&json!({
                "title": "Renamed",
                "path": "../elsewhere.txt",
                "disk": "private",
                "mime": "application/x-evil",
                "extension": "exe"
            }))
            .await;
        response.assert_status_ok();

        let body: Value = response.json();
        assert_eq!(body["data"]["title"], "Renamed");
        assert_eq!(body["data"]["path"], "upload-1.txt");
        assert_eq!(body["data"]["disk"], "public");
        assert_eq!(body["data"]["mime"], "text/plain");
        assert_eq!(body["data"]["extension"], "txt");
    }

    #[tokio::test]
    async fn test_update_validation_and_missing_file() {
        let app = test_app();
        let server = TestServer::new(app.router).unwrap();

        server
            .patch("/api/files/1")
            .json(&json!({"title": "Ghost"}))
            .await
            .assert_status_not_found();

        let response = server
            .patch("/api/files/1")
            .json(&json!({"title": "x", "slug": "Not A Slug"}))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);

        server
            .patch("/api/files/1")
            .json(&json!({"title": "   "}))
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }
}
