//! Terminal outcomes of a search attempt
//!
//! Every attempt ends in exactly one `AttemptOutcome`, failed or not.
//! Browser errors never cross this boundary raw; the state machine folds
//! them into `TransientError` here.

/// One organic result pulled off a results page
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultHit {
    /// 1-based rank in emission order
    pub position: u32,
    pub title: String,
    pub link: String,
    pub snippet: Option<String>,
}

/// Why an attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AttemptStatus {
    /// Results page reached and extracted (zero hits still counts)
    Success,
    /// Block markers on the landing page, before the query was typed
    BlockedOnLanding,
    /// Block markers after query submission
    BlockedAfterSearch,
    /// Query box never appeared within the deadline
    SearchBoxNotFound,
    /// Submission landed somewhere that is not a results page
    NotSearchPage,
    /// A browser capability failed mid-attempt
    TransientError,
}

impl AttemptStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, AttemptStatus::Success)
    }

    pub fn is_blocked(&self) -> bool {
        matches!(
            self,
            AttemptStatus::BlockedOnLanding | AttemptStatus::BlockedAfterSearch
        )
    }

    /// Short reason tag used in log lines
    pub fn reason(&self) -> &'static str {
        match self {
            AttemptStatus::Success => "success",
            AttemptStatus::BlockedOnLanding => "blocked_on_landing",
            AttemptStatus::BlockedAfterSearch => "blocked_after_search",
            AttemptStatus::SearchBoxNotFound => "search_box_not_found",
            AttemptStatus::NotSearchPage => "not_search_page",
            AttemptStatus::TransientError => "transient_error",
        }
    }
}

/// Terminal record of one attempt
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptOutcome {
    pub status: AttemptStatus,
    /// URL the page sat on when the attempt ended
    pub current_url: String,
    /// Best-effort page title, `N/A` when unreadable
    pub page_title: String,
    /// Extracted hits, empty unless `status` is `Success`
    pub results: Vec<ResultHit>,
}

impl AttemptOutcome {
    pub fn success(current_url: String, page_title: String, results: Vec<ResultHit>) -> Self {
        Self {
            status: AttemptStatus::Success,
            current_url,
            page_title,
            results,
        }
    }

    pub fn failure(status: AttemptStatus, current_url: String, page_title: String) -> Self {
        Self {
            status,
            current_url,
            page_title,
            results: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(AttemptStatus::Success.is_success());
        assert!(AttemptStatus::BlockedOnLanding.is_blocked());
        assert!(AttemptStatus::BlockedAfterSearch.is_blocked());
        assert!(!AttemptStatus::TransientError.is_blocked());
        assert!(!AttemptStatus::NotSearchPage.is_success());
    }

    #[test]
    fn test_failure_carries_no_results() {
        let outcome = AttemptOutcome::failure(
            AttemptStatus::SearchBoxNotFound,
            "https://www.example.com/".into(),
            "N/A".into(),
        );
        assert!(outcome.results.is_empty());
        assert_eq!(outcome.status.reason(), "search_box_not_found");
    }

    #[test]
    fn test_status_serializes_camel_case() {
        let json = serde_json::to_string(&AttemptStatus::BlockedOnLanding).unwrap();
        assert_eq!(json, "\"blockedOnLanding\"");
    }
}
