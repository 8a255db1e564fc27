mod file_dto;
mod upload_dto;

pub use file_dto::*;
pub use upload_dto::*;
