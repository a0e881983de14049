use parley_api::router::ApiDoc;
use utoipa::OpenApi;

/// Renders the OpenAPI document and writes it to a file.
fn write_openapi(
    api_doc: utoipa::openapi::OpenApi,
    path: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let json = api_doc.to_pretty_json()?;
    std::fs::write(path, json)?;
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "openapi.json".to_string());
    write_openapi(ApiDoc::openapi(), &path)?;
    Ok(())
}
