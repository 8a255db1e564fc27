mod file_service;
mod upload_service;

pub use file_service::FileService;
pub use upload_service::{StoreOutcome, UploadService, UploadSettings};
