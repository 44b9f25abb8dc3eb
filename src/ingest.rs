//! `rag ingest`: load structured items from a JSON file and ingest them as
//! one document.

use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;

use crate::config::Config;
use crate::services::Services;

/// Interpret file contents as a list of items.
///
/// A top-level array is the item list; any other JSON value is a single
/// item.
pub fn parse_items(content: &str) -> Result<Vec<Value>> {
    let value: Value = serde_json::from_str(content).context("Input is not valid JSON")?;
    Ok(match value {
        Value::Array(items) => items,
        other => vec![other],
    })
}

pub async fn run_ingest(config: &Config, path: &Path, filename: Option<String>) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let items = parse_items(&content)?;
    let filename = filename.unwrap_or_else(|| {
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string())
    });

    let services = Services::open(config).await?;
    let result = services.ingest_items(&filename, &items).await;
    services.close().await;
    let outcome = result?;

    if outcome.duplicate {
        println!("ingest {} (already ingested)", filename);
    } else {
        println!("ingest {}", filename);
    }
    println!("  document: {}", outcome.document.id);
    println!("  items: {}", items.len());
    println!("  chunks: {}", outcome.chunk_count);
    println!("  new chunks: {}", outcome.new_chunks);
    if outcome.skipped_windows > 0 {
        println!("  skipped duplicate chunks: {}", outcome.skipped_windows);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_array_is_item_list() {
        let items = parse_items(r#"[{"content": "a"}, {"title": "b"}]"#).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1], json!({"title": "b"}));
    }

    #[test]
    fn test_object_is_single_item() {
        let items = parse_items(r#"{"content": "only"}"#).unwrap();
        assert_eq!(items, vec![json!({"content": "only"})]);
    }

    #[test]
    fn test_invalid_json_rejected() {
        assert!(parse_items("not json").is_err());
    }
}
