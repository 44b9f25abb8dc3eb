//! `rag search`: hybrid retrieval from the command line.

use anyhow::Result;

use hybrid_rag_core::models::RetrievalResult;

use crate::config::Config;
use crate::services::Services;

const SNIPPET_CHARS: usize = 200;

pub async fn run_search(config: &Config, query: &str, top_k: Option<usize>) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let services = Services::open(config).await?;
    let top_k = top_k.unwrap_or(config.retrieval.top_k);
    let results = services.pipeline.retrieve(query, top_k).await;
    services.close().await;
    let results = results?;

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, result) in results.iter().enumerate() {
        print_result(i + 1, result);
    }
    Ok(())
}

fn print_result(rank: usize, result: &RetrievalResult) {
    println!(
        "{}. [{:.4}] chunk {} ({})",
        rank, result.score, result.chunk.chunk_index, result.source
    );
    println!("    document: {}", result.chunk.document_id);
    println!("    snippet: \"{}\"", snippet(&result.chunk.content));
    println!("    id: {}", result.chunk.id);
    println!();
}

/// First line of `text`, cut to [`SNIPPET_CHARS`] characters.
pub fn snippet(text: &str) -> String {
    let line = text.lines().next().unwrap_or("").trim();
    if line.chars().count() <= SNIPPET_CHARS {
        return line.to_string();
    }
    let cut: String = line.chars().take(SNIPPET_CHARS).collect();
    format!("{}...", cut)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snippet_takes_first_line() {
        assert_eq!(snippet("first line\nsecond"), "first line");
        assert_eq!(snippet(""), "");
    }

    #[test]
    fn test_snippet_truncates_on_char_boundary() {
        let long = "é".repeat(250);
        let s = snippet(&long);
        assert!(s.ends_with("..."));
        assert_eq!(s.chars().count(), SNIPPET_CHARS + 3);
    }
}
