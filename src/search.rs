//! Search results: projection, JSON and HTML rendering, CLI output.
//!
//! The JSON shape is an array of
//!
//! ```json
//! { "Path": "/docs/a.html", "Title": "A", "Body": "...", "Modified": "2024-01-01T00:00:00Z", "Indexed": null }
//! ```
//!
//! with RFC 3339 timestamps. `Indexed` is `null` for a document that was
//! never persisted.
//!
//! HTML pages are rendered with minijinja. The template receives `Query`,
//! `Results` (items as above), `Endpoint` and `Host`. Without a configured
//! template the built-in `templates/results.html` is used. Output is
//! HTML-escaped, except a highlighted `Body`, which is already HTML.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use minijinja::{context, Environment, Value};
use serde::Serialize;
use sitesearch_core::Record;
use std::path::Path;

use crate::config::Config;
use crate::indexer::{Indexer, SearchHit};

const TEMPLATE_NAME: &str = "results.html";
const DEFAULT_TEMPLATE: &str = include_str!("templates/results.html");

/// One search hit as served to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SearchResultItem {
    pub path: String,
    pub title: String,
    /// Highlighted fragment when the engine produced one, else the body.
    pub body: String,
    pub modified: DateTime<Utc>,
    pub indexed: Option<DateTime<Utc>>,
    /// `body` is an engine fragment with `<mark>` highlights.
    #[serde(skip)]
    pub highlighted: bool,
}

impl SearchResultItem {
    pub fn from_record(record: &Record) -> Self {
        Self {
            path: record.path().to_string(),
            title: record.title(),
            body: record.body_text(),
            modified: record.modified(),
            indexed: record.indexed(),
            highlighted: false,
        }
    }

    pub fn from_hit(hit: &SearchHit) -> Self {
        Self {
            highlighted: hit.highlighted,
            ..Self::from_record(&hit.record)
        }
    }

    fn to_template_value(&self) -> Value {
        let body = if self.highlighted {
            Value::from_safe_string(self.body.clone())
        } else {
            Value::from(self.body.as_str())
        };
        context! {
            Path => &self.path,
            Title => &self.title,
            Body => body,
            Modified => self.modified,
            Indexed => self.indexed,
        }
    }
}

/// Runs `query` and projects the hits, releasing every record.
pub async fn run_query(indexer: &Indexer, query: &str) -> Vec<SearchResultItem> {
    let hits = indexer.search(query).await;
    let items = hits.iter().map(SearchResultItem::from_hit).collect();
    for hit in hits {
        indexer.kill(hit.record);
    }
    items
}

/// Compiled result-page template.
pub struct ResultPage {
    env: Environment<'static>,
}

impl ResultPage {
    /// Compiles `source`, or the built-in template when `None`.
    pub fn new(source: Option<String>) -> Result<Self> {
        let mut env = Environment::new();
        env.add_template_owned(
            TEMPLATE_NAME,
            source.unwrap_or_else(|| DEFAULT_TEMPLATE.to_string()),
        )
        .context("Failed to compile search results template")?;
        Ok(Self { env })
    }

    /// Loads the template configured in `[search].template`, if any.
    pub fn from_config(config: &Config) -> Result<Self> {
        match config.template_path() {
            Some(path) => Self::new(Some(read_template(&path)?)),
            None => Self::new(None),
        }
    }

    pub fn render(
        &self,
        query: &str,
        results: &[SearchResultItem],
        endpoint: &str,
        host: &str,
    ) -> Result<String> {
        let template = self.env.get_template(TEMPLATE_NAME)?;
        let results: Vec<Value> = results
            .iter()
            .map(SearchResultItem::to_template_value)
            .collect();
        let html = template
            .render(context! {
                Query => query,
                Results => results,
                Endpoint => endpoint,
                Host => host,
            })
            .context("Failed to render search results")?;
        Ok(html)
    }
}

fn read_template(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read template: {}", path.display()))
}

/// Prints `results` for the `search` command.
pub fn print_results(results: &[SearchResultItem], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(results)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, result) in results.iter().enumerate() {
        let title = if result.title.is_empty() {
            "(untitled)"
        } else {
            result.title.as_str()
        };
        println!("{}. {} ({})", i + 1, title, result.path);
        println!("    modified: {}", result.modified.format("%Y-%m-%d"));
        if let Some(indexed) = result.indexed {
            println!("    indexed: {}", indexed.to_rfc3339());
        }
        println!(
            "    excerpt: \"{}\"",
            result.body.replace('\n', " ").trim()
        );
        println!();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(path: &str, title: &str, body: &str) -> SearchResultItem {
        SearchResultItem {
            path: path.to_string(),
            title: title.to_string(),
            body: body.to_string(),
            modified: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            indexed: None,
            highlighted: false,
        }
    }

    #[test]
    fn json_uses_capitalized_fields_and_null_indexed() {
        let value = serde_json::to_value(item("/a", "A", "body")).unwrap();
        assert_eq!(value["Path"], "/a");
        assert_eq!(value["Title"], "A");
        assert_eq!(value["Body"], "body");
        assert_eq!(value["Modified"], "2023-11-14T22:13:20Z");
        assert!(value["Indexed"].is_null());
    }

    #[test]
    fn default_template_lists_results_and_escapes() {
        let page = ResultPage::new(None).unwrap();
        let html = page
            .render(
                "rust <b>",
                &[item("/a.html", "Alpha & Omega", "text"), item("/b.html", "Beta", "more")],
                "/search",
                "example.com",
            )
            .unwrap();
        assert!(html.contains("Found <b>2</b> results"));
        assert!(html.contains("example.com"));
        assert!(html.contains("Beta"));
        assert!(html.contains("Alpha &amp; Omega"));
        assert!(html.contains("rust &lt;b&gt;"));
    }

    #[test]
    fn highlighted_fragments_render_as_markup() {
        let page = ResultPage::new(None).unwrap();
        let marked = SearchResultItem {
            highlighted: true,
            ..item("/a.html", "A", "the <mark>walrus</mark> &amp; seal")
        };
        let plain = item("/b.html", "B", "raw <b>bold</b>");
        let html = page
            .render("walrus", &[marked, plain], "/search", "localhost")
            .unwrap();
        assert!(html.contains("the <mark>walrus</mark> &amp; seal"), "{}", html);
        assert!(!html.contains("&lt;mark&gt;"));
        assert!(html.contains("raw &lt;b&gt;bold"), "{}", html);
    }

    #[test]
    fn highlighted_flag_stays_out_of_json() {
        let value = serde_json::to_value(SearchResultItem {
            highlighted: true,
            ..item("/a", "A", "<mark>a</mark>")
        })
        .unwrap();
        assert_eq!(value["Body"], "<mark>a</mark>");
        assert!(value.get("Highlighted").is_none());
    }

    #[test]
    fn empty_query_renders_only_the_form() {
        let page = ResultPage::new(None).unwrap();
        let html = page.render("", &[], "/search", "localhost").unwrap();
        assert!(html.contains("<form"));
        assert!(!html.contains("Found"));
    }

    #[test]
    fn custom_template_is_used() {
        let page = ResultPage::new(Some("{{ Results|length }} for {{ Query }}".to_string())).unwrap();
        assert_eq!(
            page.render("q", &[item("/a", "A", "b")], "/s", "h").unwrap(),
            "1 for q"
        );
    }

    #[test]
    fn broken_template_fails_to_compile() {
        assert!(ResultPage::new(Some("{% for %}".to_string())).is_err());
    }
}
