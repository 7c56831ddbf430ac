//! Single document lookup by logical path, for `sitesearch get`.

use anyhow::{bail, Result};

use crate::indexer::Indexer;
use crate::search::SearchResultItem;

/// Loads the persisted document stored under `path`.
pub async fn get_document(indexer: &Indexer, path: &str) -> Result<SearchResultItem> {
    let record = indexer.record(path);
    let found = indexer.load(&record).await;
    let item = SearchResultItem::from_record(&record);
    indexer.kill(record);
    if !found {
        bail!("document not found: {}", path);
    }
    Ok(item)
}

/// CLI entry point; exits with status 1 when the path is not indexed.
pub async fn run_get(indexer: &Indexer, path: &str, json: bool) -> Result<()> {
    let doc = match get_document(indexer, path).await {
        Ok(d) => d,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    println!("--- Document ---");
    println!("path:     {}", doc.path);
    println!(
        "title:    {}",
        if doc.title.is_empty() { "(untitled)" } else { doc.title.as_str() }
    );
    println!("modified: {}", doc.modified.to_rfc3339());
    match doc.indexed {
        Some(indexed) => println!("indexed:  {}", indexed.to_rfc3339()),
        None => println!("indexed:  never"),
    }
    println!();
    println!("--- Body ---");
    println!("{}", doc.body);
    Ok(())
}
