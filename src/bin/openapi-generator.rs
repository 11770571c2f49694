//! Print the OpenAPI document of the HTTP surface to stdout.

use utoipa::OpenApi;
use word_derby_back::services::documentation::ApiDoc;

fn main() -> anyhow::Result<()> {
    let doc = ApiDoc::openapi();
    println!("{}", doc.to_pretty_json()?);
    Ok(())
}
