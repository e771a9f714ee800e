//! services/api/src/bin/openapi.rs
//!
//! Writes the weight tracker's OpenAPI document to disk.
//!
//! Usage: `openapi [OUTPUT]`, where `OUTPUT` defaults to `openapi.json`.

use api_lib::web::rest::ApiDoc;
use utoipa::OpenApi;

const DEFAULT_OUTPUT: &str = "openapi.json";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let output = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_OUTPUT.to_string());

    let document = ApiDoc::openapi();
    let route_count = document.paths.paths.len();
    std::fs::write(&output, document.to_pretty_json()?)?;

    println!("Wrote {} ({} routes)", output, route_count);
    Ok(())
}
