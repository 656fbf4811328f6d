//! Print the OpenAPI document of the REST API to stdout.

use anyhow::Context;
use gavel_back::services::documentation::ApiDoc;
use utoipa::OpenApi;

fn main() -> anyhow::Result<()> {
    let doc = ApiDoc::openapi()
        .to_pretty_json()
        .context("serializing OpenAPI document")?;
    println!("{doc}");
    Ok(())
}
