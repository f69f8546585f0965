// Pure helpers for the post lifecycle: no I/O here.
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;

use crate::config::FeedConfig;
use crate::error::AppError;

static HASHTAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#([A-Za-z0-9_]+)").expect("hashtag pattern is valid"));

/// Hashtags in caption order, lowercased, duplicates kept.
pub fn extract_tags(caption: &str) -> Vec<String> {
    HASHTAG_RE
        .captures_iter(caption)
        .map(|c| c[1].to_lowercase())
        .collect()
}

/// Parse a post id path segment. Anything but a base-10 integer is rejected
/// before touching the database.
pub fn parse_post_id(raw: &str) -> Result<i64, AppError> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| AppError::InvalidArgument("Invalid post ID".to_string()))
}

/// Raw `?page=&limit=` query. Kept as strings so junk input falls back to
/// the defaults instead of failing extraction.
#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: i64,
    pub limit: i64,
}

impl Page {
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

impl PageParams {
    /// Missing or non-numeric values take the defaults; `page` is clamped to
    /// at least 1 and `limit` into `1..=max_limit`.
    pub fn resolve(&self, config: &FeedConfig) -> Page {
        let parse = |v: &Option<String>| v.as_deref().and_then(|s| s.trim().parse::<i64>().ok());

        let page = parse(&self.page).unwrap_or(1).max(1);
        let limit = parse(&self.limit)
            .unwrap_or(config.default_limit)
            .clamp(1, config.max_limit.max(1));

        Page { page, limit }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(page: Option<&str>, limit: Option<&str>) -> PageParams {
        PageParams {
            page: page.map(str::to_string),
            limit: limit.map(str::to_string),
        }
    }

    #[test]
    fn tags_are_case_folded_in_order_with_duplicates() {
        assert_eq!(
            extract_tags("hello #Foo #bar_baz #Foo"),
            vec!["foo", "bar_baz", "foo"]
        );
    }

    #[test]
    fn tags_stop_at_non_word_characters() {
        assert_eq!(extract_tags("#rust-lang #a.b #C3PO!"), vec!["rust", "a", "c3po"]);
    }

    #[test]
    fn captions_without_tags_yield_nothing() {
        assert!(extract_tags("no tags here # nor here").is_empty());
        assert!(extract_tags("").is_empty());
    }

    #[test]
    fn post_id_parsing() {
        assert_eq!(parse_post_id("42").unwrap(), 42);
        assert!(matches!(
            parse_post_id("abc"),
            Err(AppError::InvalidArgument(_))
        ));
        assert!(parse_post_id("").is_err());
        assert!(parse_post_id("4.2").is_err());
    }

    #[test]
    fn defaults_apply_to_missing_and_junk_values() {
        let config = FeedConfig::default();
        assert_eq!(params(None, None).resolve(&config), Page { page: 1, limit: 10 });
        assert_eq!(
            params(Some("two"), Some("ten")).resolve(&config),
            Page { page: 1, limit: 10 }
        );
    }

    #[test]
    fn non_positive_values_are_clamped() {
        let config = FeedConfig::default();
        assert_eq!(
            params(Some("0"), Some("-5")).resolve(&config),
            Page { page: 1, limit: 1 }
        );
        assert_eq!(
            params(Some("-3"), Some("1000")).resolve(&config),
            Page { page: 1, limit: 100 }
        );
    }

    #[test]
    fn offset_is_zero_based() {
        let page = params(Some("2"), Some("10")).resolve(&FeedConfig::default());
        assert_eq!(page.offset(), 10);
        assert_eq!(Page { page: 1, limit: 10 }.offset(), 0);
    }
}
