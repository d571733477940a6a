//! Google provider
//!
//! Selector sets stay deliberately wide; Google reshuffles SERP class names
//! often and the consent wall varies by locale.

use once_cell::sync::Lazy;
use scraper::{Html, Selector};

use super::{
    absolute_link, blocked_by_markers, css, element_text, first_text, PageSnapshot,
    SearchProvider,
};
use crate::search::ResultHit;

const HOME_URL: &str = "https://www.google.com/";

const CONSENT_SELECTORS: &[&str] = &[
    "button#L2AGLb",                   // "Accept all" on the consent wall
    "button[aria-label='Accept all']", // aria variant in some locales
    "button[aria-label='I agree']",    // older interstitial
    "form[action*='consent'] button",  // consent.google.com redirect form
];

const QUERY_BOX: &str = "textarea[name='q'], input[name='q']";

const CHALLENGE_FRAME: &str = "iframe[src*='recaptcha']";

const BLOCK_URL_MARKERS: &[&str] = &["/sorry/"];

const BLOCK_PHRASES: &[&str] = &[
    "unusual traffic",
    "our systems have detected unusual traffic",
    "to continue, please type the characters",
];

// Result blocks nest across Google layout generations, so all three
// container classes are tried in document order.
static RESULT_BLOCKS: Lazy<Selector> = Lazy::new(|| css("div.g, div.MjjYud, .tF2Cxc"));
static RESULT_LINK: Lazy<Selector> = Lazy::new(|| css("a[href^='http']"));
static RESULT_TITLE: Lazy<Selector> = Lazy::new(|| css("h3"));
static SNIPPET_CANDIDATES: Lazy<Vec<Selector>> =
    Lazy::new(|| vec![css(".VwiC3b"), css(".IsZvec"), css(".aCOpRe")]);

/// Google web search
#[derive(Debug, Clone, Copy)]
pub struct GoogleProvider;

impl SearchProvider for GoogleProvider {
    fn name(&self) -> &'static str {
        "google"
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

            let link = block
                .select(&RESULT_LINK)
                .next()
                .and_then(|a| a.value().attr("href"))
                .and_then(absolute_link);
            let title = block
                .select(&RESULT_TITLE)
                .next()
                .map(|el| element_text(&el))
                .filter(|t| !t.is_empty());

            let (link, title) = match (link, title) {
                (Some(link), Some(title)) => (link, title),
                _ => continue,
            };

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
