//! Search engine providers
//!
//! A provider bundles everything engine-specific: landing URL, consent and
//! query box selectors, soft-block markers and the result extractor. Block
//! detection and extraction are pure over snapshots and raw HTML so they
//! test without a browser.

mod bing;
mod google;

pub use bing::BingProvider;
pub use google::GoogleProvider;

use scraper::{ElementRef, Selector};
use url::Url;

use crate::search::ResultHit;

/// Which engine a run drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProviderKind {
    Google,
    Bing,
}

impl Default for ProviderKind {
    fn default() -> Self {
        ProviderKind::Google
    }
}

impl ProviderKind {
    pub fn provider(&self) -> &'static dyn SearchProvider {
        match self {
            ProviderKind::Google => &GoogleProvider,
            ProviderKind::Bing => &BingProvider,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Google => "google",
            ProviderKind::Bing => "bing",
        }
    }
}

/// What block detection is allowed to see of a page
#[derive(Debug, Clone, Default)]
pub struct PageSnapshot {
    pub url: String,
    pub title: String,
    pub visible_text: String,
    pub has_challenge_frame: bool,
}

/// Engine-specific behavior needed by the attempt state machine
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Landing page the attempt starts from
    fn home_url(&self) -> &'static str;

    /// Ordered consent button candidates, clicked best effort
    fn consent_selectors(&self) -> &'static [&'static str];

    /// Selector for the query input
    fn query_box_selector(&self) -> &'static str;

    /// Challenge iframe selector surfaced into snapshots
    fn challenge_frame_selector(&self) -> &'static str;

    /// Soft-block predicate over a snapshot
    fn is_blocked(&self, snapshot: &PageSnapshot) -> bool;

    /// Loose results-page check. Locale variants move the path around, so a
    /// substring match beats an exact one here; both block checks run first.
    fn is_results_url(&self, url: &str) -> bool {
        url.contains("/search") || url.contains("q=")
    }

    /// Pull up to `limit` organic hits out of raw results-page HTML
    fn extract(&self, html: &str, limit: usize) -> Vec<ResultHit>;
}

/// Parse a CSS selector literal.
pub(crate) fn css(selector: &str) -> Selector {
    Selector::parse(selector).expect("static selector")
}

/// Marker union shared by the provider block predicates.
pub(crate) fn blocked_by_markers(
    snapshot: &PageSnapshot,
    url_markers: &[&str],
    phrases: &[&str],
) -> bool {
    let url = snapshot.url.to_lowercase();
    if url_markers.iter().any(|m| url.contains(m)) {
        return true;
    }
    let text = snapshot.visible_text.to_lowercase();
    if phrases.iter().any(|p| text.contains(p)) {
        return true;
    }
    snapshot.has_challenge_frame
}

/// Keep only absolute http(s) links; relative hrefs are navigation chrome.
pub(crate) fn absolute_link(href: &str) -> Option<String> {
    let parsed = Url::parse(href).ok()?;
    match parsed.scheme() {
        "http" | "https" => Some(href.to_string()),
        _ => None,
    }
}

/// Concatenated, trimmed text content of an element.
pub(crate) fn element_text(el: &ElementRef) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// Text of the first candidate selector with a non-empty match.
pub(crate) fn first_text(scope: &ElementRef, candidates: &[Selector]) -> Option<String> {
    for selector in candidates {
        if let Some(el) = scope.select(selector).next() {
            let text = element_text(&el);
            if !text.is_empty() {
                return Some(text);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_results_url_heuristic_is_loose() {
        let provider = ProviderKind::Google.provider();
        assert!(provider.is_results_url("https://www.google.com/search?q=rust"));
        assert!(provider.is_results_url("https://www.google.de/webhp?q=rust"));
        assert!(provider.is_results_url("https://www.bing.com/search?q=rust&form=QBLH"));
        assert!(!provider.is_results_url("https://www.google.com/"));
        assert!(!provider.is_results_url("https://consent.google.com/m"));
    }

    #[test]
    fn test_absolute_link_filter() {
        assert_eq!(
            absolute_link("https://example.com/a"),
            Some("https://example.com/a".to_string())
        );
        assert_eq!(absolute_link("http://example.com"), Some("http://example.com".to_string()));
        assert_eq!(absolute_link("/relative/path"), None);
        assert_eq!(absolute_link("javascript:void(0)"), None);
    }

    #[test]
    fn test_provider_kind_round_trip() {
        let kind: ProviderKind = serde_json::from_str("\"bing\"").unwrap();
        assert_eq!(kind, ProviderKind::Bing);
        assert_eq!(serde_json::to_string(&ProviderKind::Google).unwrap(), "\"google\"");
        assert_eq!(ProviderKind::default(), ProviderKind::Google);
    }

    #[test]
    fn test_challenge_frame_alone_blocks() {
        let snapshot = PageSnapshot {
            url: "https://www.google.com/".into(),
            title: "Google".into(),
            visible_text: "ordinary page".into(),
            has_challenge_frame: true,
        };
        assert!(blocked_by_markers(&snapshot, &[], &[]));
    }
}
