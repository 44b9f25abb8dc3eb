//! `rag documents` and `rag delete`.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::services::Services;

const LIST_LIMIT: usize = 1000;

pub async fn run_list(config: &Config) -> Result<()> {
    let services = Services::open(config).await?;
    let docs = services.list_documents(LIST_LIMIT, 0).await;
    services.close().await;
    let docs = docs?;

    if docs.is_empty() {
        println!("No documents.");
        return Ok(());
    }

    println!("{:<36}  {:<20}  {:>6}  FILENAME", "ID", "CREATED", "CHUNKS");
    for (doc, chunk_count) in &docs {
        println!(
            "{:<36}  {:<20}  {:>6}  {}",
            doc.id,
            doc.created_at.format("%Y-%m-%d %H:%M:%S"),
            chunk_count,
            doc.filename
        );
    }
    Ok(())
}

pub async fn run_delete(config: &Config, id: &str) -> Result<()> {
    let services = Services::open(config).await?;
    let deleted = services.delete_document(id).await;
    services.close().await;

    if !deleted? {
        bail!("document not found: {}", id);
    }
    println!("deleted {}", id);
    Ok(())
}
