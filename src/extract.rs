//! Content classification and HTML text extraction.
//!
//! A document is one of three things:
//!
//! | Kind | Detected by | Title | Body |
//! |------|-------------|-------|------|
//! | plain text | path suffix (`.txt`, `.md`) | last path segment | unchanged |
//! | HTML | a non-empty `<title>` element | `<title>` text | visible text, tags stripped |
//! | unindexable | anything else | - | - |
//!
//! HTML is parsed with html5ever (through scraper), so entities, stray `<`
//! characters and unclosed tags follow browser rules. Text under `<script>`,
//! `<style>`, `<noscript>` and `<template>` is skipped, as are comments.

use scraper::{Html, Node};

/// Path suffixes indexed verbatim.
pub const TEXT_SUFFIXES: &[&str] = &[".txt", ".md"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extracted {
    /// Plain text; only the title is derived.
    Text { title: String },
    /// HTML with a title and sanitized body text.
    Html { title: String, body: String },
    /// Not indexable.
    Unindexable,
}

pub fn is_text_path(path: &str) -> bool {
    TEXT_SUFFIXES.iter().any(|suffix| path.ends_with(suffix))
}

/// Last `/`-separated segment of `path`.
pub fn base_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rsplit_once('/') {
        Some((_, last)) if !last.is_empty() => last,
        _ if trimmed.is_empty() => "/",
        _ => trimmed,
    }
}

pub fn classify(path: &str, body: &[u8]) -> Extracted {
    if is_text_path(path) {
        return Extracted::Text {
            title: base_name(path).to_string(),
        };
    }
    match extract_html(body) {
        Some((title, body)) => Extracted::Html { title, body },
        None => Extracted::Unindexable,
    }
}

/// Elements whose text never reaches the index.
const SKIPPED: &[&str] = &["script", "style", "noscript", "template"];

fn push_words(out: &mut String, text: &str) {
    for word in text.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
}

/// Extracts `(title, body_text)`, or `None` when no non-empty `<title>`
/// is found.
pub fn extract_html(bytes: &[u8]) -> Option<(String, String)> {
    let source = String::from_utf8_lossy(bytes);
    let doc = Html::parse_document(&source);

    let mut title = String::new();
    let mut body = String::new();
    let mut stack = vec![(doc.tree.root(), false)];
    while let Some((node, in_title)) = stack.pop() {
        let in_title = match node.value() {
            Node::Text(text) => {
                push_words(if in_title { &mut title } else { &mut body }, text);
                continue;
            }
            Node::Element(el) if SKIPPED.contains(&el.name()) => continue,
            Node::Element(el) => in_title || el.name() == "title",
            Node::Document | Node::Fragment => in_title,
            _ => continue,
        };
        for child in node.children().rev() {
            stack.push((child, in_title));
        }
    }

    if title.is_empty() {
        None
    } else {
        Some((title, body))
    }
}
