use axum::{routing::get, Router};
use std::sync::Arc;

use crate::features::files::handlers;
use crate::features::files::services::{FileService, UploadService};
use crate::shared::flash::FlashStore;
use crate::shared::views::ViewRenderer;

/// Shared state of the files feature
#[derive(Clone)]
pub struct FilesState {
    pub files: Arc<FileService>,
    pub uploads: Arc<UploadService>,
    pub views: Arc<ViewRenderer>,
    pub flashes: Arc<FlashStore>,
}

/// Admin pages and the JSON API
pub fn admin_routes(state: FilesState) -> Router {
    Router::new()
        .route("/files", get(handlers::index).post(handlers::store))
        .route("/files/create", get(handlers::create))
        .route("/files/upload-error", get(handlers::upload_error))
        .route(
            "/files/{id}",
            get(handlers::show)
                .put(handlers::update)
                .patch(handlers::update)
                .delete(handlers::destroy)
                .post(handlers::method_override),
        )
        .route("/files/{id}/edit", get(handlers::edit))
        .route(
            "/api/files",
            get(handlers::list_files).post(handlers::upload_file),
        )
        .route(
            "/api/files/{id}",
            get(handlers::get_file)
                .patch(handlers::update_file)
                .delete(handlers::delete_file),
        )
        .with_state(state)
}

/// Downloads by public link, reachable without admin credentials
pub fn public_routes(state: FilesState) -> Router {
    Router::new()
        .route("/download/{slug}", get(handlers::download))
        .with_state(state)
}
