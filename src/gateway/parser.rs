//! The Parser contract — the five pure methods the Gateway is
//! constructed with. No HTML parsing lives here; per-site parsers are
//! independent modules the caller injects.
//!
//! Grounded on dynamic dispatch over parsers injected at construction;
//! the trait-object shape mirrors `core/tools_registry.rs`, which
//! registers independent tool implementations behind one common
//! interface rather than matching on a type tag.

use async_trait::async_trait;

/// A single result-list entry from a main-page or search listing.
#[derive(Debug, Clone)]
pub struct ParsedItem {
    pub title: String,
    pub url: String,
    pub thumbnail: Option<String>,
}

/// The metadata a "load page" (detail page) parses into.
#[derive(Debug, Clone)]
pub struct ParsedLoadData {
    pub title: String,
    pub description: Option<String>,
    pub seasons: Vec<String>,
}

/// One episode entry from an episode listing.
#[derive(Debug, Clone)]
pub struct ParsedEpisode {
    pub season: Option<String>,
    pub number: Option<u32>,
    pub title: String,
    pub url: String,
}

/// The five pure, synchronous-in-spirit operations a per-site parser
/// implements over an opaque parsed document. The Gateway never inspects
/// `Doc`'s contents — it only hands it to whichever parser the caller
/// constructed it with.
#[async_trait]
pub trait Parser<Doc>: Send + Sync {
    async fn parse_main_page(&self, doc: &Doc) -> Vec<ParsedItem>;
    async fn parse_search(&self, doc: &Doc) -> Vec<ParsedItem>;
    async fn parse_load_page(&self, doc: &Doc, url: &str) -> Option<ParsedLoadData>;
    async fn parse_episodes(&self, doc: &Doc, season: Option<&str>) -> Vec<ParsedEpisode>;
    async fn extract_player_urls(&self, doc: &Doc) -> Vec<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedParser;

    #[async_trait]
    impl Parser<String> for FixedParser {
        async fn parse_main_page(&self, doc: &String) -> Vec<ParsedItem> {
            vec![ParsedItem {
                title: doc.clone(),
                url: "https://example.test/a".to_string(),
                thumbnail: None,
            }]
        }
        async fn parse_search(&self, _doc: &String) -> Vec<ParsedItem> {
            vec![]
        }
        async fn parse_load_page(&self, doc: &String, _url: &str) -> Option<ParsedLoadData> {
            Some(ParsedLoadData {
                title: doc.clone(),
                description: None,
                seasons: vec![],
            })
        }
        async fn parse_episodes(&self, _doc: &String, _season: Option<&str>) -> Vec<ParsedEpisode> {
            vec![]
        }
        async fn extract_player_urls(&self, _doc: &String) -> Vec<String> {
            vec![]
        }
    }

    #[tokio::test]
    async fn trait_object_is_callable_through_dyn_dispatch() {
        let parser: Box<dyn Parser<String>> = Box::new(FixedParser);
        let items = parser.parse_main_page(&"Example".to_string()).await;
        assert_eq!(items[0].title, "Example");
    }
}
