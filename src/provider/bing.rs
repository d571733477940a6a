//! Bing provider

use once_cell::sync::Lazy;
use scraper::{Html, Selector};

use super::{
    absolute_link, blocked_by_markers, css, element_text, first_text, PageSnapshot,
    SearchProvider,
};
use crate::search::ResultHit;

const HOME_URL: &str = "https://www.bing.com/";

const CONSENT_SELECTORS: &[&str] = &[
    "button#bnp_btn_accept",        // cookie banner accept
    "button#bnp_btn_agree",         // older banner variant
    "#bnp_container button.accept", // container fallback
];

const QUERY_BOX: &str = "#sb_form_q";

const CHALLENGE_FRAME: &str = "iframe[src*='captcha']";

const BLOCK_URL_MARKERS: &[&str] = &["captcha", "blocked"];

const BLOCK_PHRASES: &[&str] = &[
    "unusual traffic",
    "verify you are human",
    "complete the security check",
];

static RESULT_BLOCKS: Lazy<Selector> = Lazy::new(|| css("li.b_algo"));
static RESULT_LINK: Lazy<Selector> = Lazy::new(|| css("h2 a[href]"));
static SNIPPET_CANDIDATES: Lazy<Vec<Selector>> =
    Lazy::new(|| vec![css(".b_caption p"), css(".b_paractl"), css("p")]);

/// Bing web search
#[derive(Debug, Clone, Copy)]
pub struct BingProvider;

impl SearchProvider for BingProvider {
    fn name(&self) -> &'static str {
        "bing"
    }

    fn home_url(&self) -> &'static str {
        HOME_URL
    }

    fn consent_selectors(&self) -> &'static [&'static str] {
        CONSENT_SELECTORS
    }

    fn query_box_selector(&self) -> &'static str {
        QUERY_BOX
    }

    fn challenge_frame_selector(&self) -> &'static str {
        CHALLENGE_FRAME
    }

    fn is_blocked(&self, snapshot: &PageSnapshot) -> bool {
        blocked_by_markers(snapshot, BLOCK_URL_MARKERS, BLOCK_PHRASES)
    }

    fn extract(&self, html: &str, limit: usize) -> Vec<ResultHit> {
        let doc = Html::parse_document(html);
        let mut out = Vec::new();

        for block in doc.select(&RESULT_BLOCKS) {
            if out.len() >= limit {
                break;
            }

            // Title and link come off the same h2 anchor
            let anchor = match block.select(&RESULT_LINK).next() {
                Some(a) => a,
                None => continue,
            };
            let link = match anchor.value().attr("href").and_then(absolute_link) {
                Some(link) => link,
                None => continue,
            };
            let title = element_text(&anchor);
            if title.is_empty() {
                continue;
            }

            let snippet = first_text(&block, &SNIPPET_CANDIDATES);
            out.push(ResultHit {
                position: out.len() as u32 + 1,
                title,
                link,
                snippet,
            });
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(url: &str, text: &str, challenge: bool) -> PageSnapshot {
        PageSnapshot {
            url: url.to_string(),
            title: "Bing".to_string(),
            visible_text: text.to_string(),
            has_challenge_frame: challenge,
        }
    }

    #[test]
    fn test_blocked_by_captcha_url() {
        assert!(BingProvider.is_blocked(&snapshot(
            "https://www.bing.com/turing/captcha/challenge",
            "",
            false
        )));
        assert!(BingProvider.is_blocked(&snapshot("https://www.bing.com/blocked", "", false)));
    }

    #[test]
    fn test_blocked_by_phrase() {
        assert!(BingProvider.is_blocked(&snapshot(
            "https://www.bing.com/",
            "Please verify you are human before continuing.",
            false
        )));
    }

    #[test]
    fn test_clean_results_page_not_blocked() {
        assert!(!BingProvider.is_blocked(&snapshot(
            "https://www.bing.com/search?q=rust",
            "About 1,230,000 results",
            false
        )));
    }

    const SERP_FIXTURE: &str = r#"
        <html><body><ol id="b_results">
          <li class="b_algo">
            <h2><a href="https://example.com/alpha">Alpha page</a></h2>
            <div class="b_caption"><p>Alpha snippet.</p></div>
          </li>
          <li class="b_algo">
            <h2>No anchor here</h2>
          </li>
          <li class="b_algo">
            <h2><a href="https://example.com/beta">Beta page</a></h2>
          </li>
          <li class="b_algo">
            <h2><a href="https://example.com/gamma">Gamma page</a></h2>
            <p>Loose paragraph snippet.</p>
          </li>
        </ol></body></html>
    "#;

    #[test]
    fn test_extract_bing_results() {
        let hits = BingProvider.extract(SERP_FIXTURE, 10);
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].title, "Alpha page");
        assert_eq!(hits[0].snippet.as_deref(), Some("Alpha snippet."));
        assert_eq!(hits[1].title, "Beta page");
        assert_eq!(hits[1].snippet, None);
        assert_eq!(hits[2].snippet.as_deref(), Some("Loose paragraph snippet."));
    }

    #[test]
    fn test_extract_limit_applies_after_skips() {
        let hits = BingProvider.extract(SERP_FIXTURE, 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[1].link, "https://example.com/beta");
    }
}
