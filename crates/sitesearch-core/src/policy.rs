//! Include/exclude policy over logical document paths.
//!
//! A path is indexable iff it matches no exclude pattern and at least one
//! include pattern. Exclusion is checked first. An empty include list
//! admits nothing, so callers seed `^/` when the user configured none.

use regex::Regex;
use tracing::warn;

/// The include pattern that admits every logical path.
pub const MATCH_ALL: &str = "^/";

#[derive(Debug, Clone, Default)]
pub struct PathPolicy {
    include: Vec<Regex>,
    exclude: Vec<Regex>,
}

impl PathPolicy {
    pub fn new(include: Vec<Regex>, exclude: Vec<Regex>) -> Self {
        Self { include, exclude }
    }

    /// Compiles both lists, skipping patterns that fail to compile.
    pub fn compile<S: AsRef<str>>(include: &[S], exclude: &[S]) -> Self {
        Self::new(compile_patterns(include), compile_patterns(exclude))
    }

    /// A policy that admits every path starting with `/`.
    pub fn match_all() -> Self {
        Self::compile(&[MATCH_ALL], &[])
    }

    pub fn is_indexable(&self, path: &str) -> bool {
        if self.exclude.iter().any(|re| re.is_match(path)) {
            return false;
        }
        self.include.iter().any(|re| re.is_match(path))
    }

    pub fn include_patterns(&self) -> impl Iterator<Item = &str> {
        self.include.iter().map(Regex::as_str)
    }

    pub fn exclude_patterns(&self) -> impl Iterator<Item = &str> {
        self.exclude.iter().map(Regex::as_str)
    }
}

/// Compiles each pattern in order; a malformed one is logged and dropped.
pub fn compile_patterns<S: AsRef<str>>(patterns: &[S]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|p| match Regex::new(p.as_ref()) {
            Ok(re) => Some(re),
            Err(e) => {
                warn!(pattern = p.as_ref(), error = %e, "skipping invalid path pattern");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exclude_wins_over_include() {
        let cases = [
            ("^/", "^/private"),
            ("\\.html$", "^/drafts/"),
            ("^/docs", "secret"),
        ];
        let paths = [
            "/private/index.html",
            "/drafts/post.html",
            "/docs/secret.md",
        ];
        for ((inc, exc), path) in cases.iter().zip(paths.iter()) {
            let policy = PathPolicy::compile(&[*inc], &[*exc]);
            assert!(!policy.is_indexable(path), "{} should be excluded", path);
        }
    }

    #[test]
    fn include_required() {
        let policy = PathPolicy::compile(&["^/docs/"], &[]);
        assert!(policy.is_indexable("/docs/a.md"));
        assert!(!policy.is_indexable("/blog/a.md"));
    }

    #[test]
    fn empty_include_admits_nothing() {
        let policy = PathPolicy::compile::<&str>(&[], &[]);
        assert!(!policy.is_indexable("/index.html"));
    }

    #[test]
    fn invalid_patterns_are_skipped() {
        let policy = PathPolicy::compile(&["(unclosed", "^/ok"], &["[bad"]);
        assert_eq!(policy.include_patterns().collect::<Vec<_>>(), vec!["^/ok"]);
        assert_eq!(policy.exclude_patterns().count(), 0);
        assert!(policy.is_indexable("/ok/page"));
    }

    #[test]
    fn match_all_admits_rooted_paths() {
        let policy = PathPolicy::match_all();
        assert!(policy.is_indexable("/README.md"));
        assert!(!policy.is_indexable("relative.md"));
    }
}
