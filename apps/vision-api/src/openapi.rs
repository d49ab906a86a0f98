use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    components(
        schemas(axum_helpers::ErrorResponse)
    ),
    info(
        title = "Vision API",
        version = "0.1.0",
        description = "Streams product recognition and visual-similarity ranking as server-sent events"
    ),
    servers(
        (url = "/api", description = "API base path")
    ),
    nest(
        (path = "/vision", api = domain_vision::ApiDoc)
    )
)]
pub struct ApiDoc;
