use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::features::files::{dtos as files_dtos, handlers as files_handlers, models as files_models};
use crate::shared::types::{ApiResponse, Meta};

#[derive(OpenApi)]
#[openapi(
    paths(
        // Files
        files_handlers::list_files,
        files_handlers::upload_file,
        files_handlers::get_file,
        files_handlers::update_file,
        files_handlers::delete_file,
    ),
    components(
        schemas(
            // Shared
            Meta,
            // Files
            files_models::File,
            files_dtos::SortDirection,
            files_dtos::UploadFileDto,
            files_dtos::UpdateFileDto,
            files_dtos::FileDto,
            files_dtos::FileDetailDto,
            ApiResponse<files_dtos::FileDto>,
            ApiResponse<Vec<files_dtos::FileDto>>,
            ApiResponse<files_dtos::FileDetailDto>,
        )
    ),
    tags(
        (name = "files", description = "File upload and management"),
    ),
    modifiers(&SecurityAddon),
    info(
        title = "Filedesk API",
        version = "0.1.0",
        description = "API documentation for Filedesk",
    )
)]
pub struct ApiDoc;

/// Adds the admin basic auth security scheme to the OpenAPI spec
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "basic_auth",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Basic).build()),
            );
        }
    }
}

/// Modifier to override OpenAPI info from config
pub struct SwaggerInfoModifier {
    pub title: String,
    pub version: String,
    pub description: String,
}

impl Modify for SwaggerInfoModifier {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        openapi.info.title = self.title.clone();
        openapi.info.version = self.version.clone();
        openapi.info.description = Some(self.description.clone());
    }
}
