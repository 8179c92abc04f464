//! Cache-expiration policy for upstream responses.
//!
//! Weekly analytics snapshots never change once fetched, so successful
//! Canvas analytics responses are cached forever. Everything else is
//! not cached.

use regex::Regex;
use std::sync::OnceLock;

/// What to do with a response that passed through the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheDecision {
    /// Cache with no expiration.
    CacheForever,
    /// Do not cache.
    NoCache,
}

fn analytics_url() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^/api/v1/.*analytics.*").expect("static regex"))
}

/// Decides cacheability of a response by service, URL path, and status.
pub fn cache_decision(service: &str, url_path: &str, status: u16) -> CacheDecision {
    if service == "canvas" && status == 200 && analytics_url().is_match(url_path) {
        return CacheDecision::CacheForever;
    }
    CacheDecision::NoCache
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canvas_analytics_success_cached_forever() {
        assert_eq!(
            cache_decision(
                "canvas",
                "/api/v1/courses/7/analytics/users/11/assignments",
                200
            ),
            CacheDecision::CacheForever
        );
        assert_eq!(
            cache_decision("canvas", "/api/v1/courses/7/analytics/student_summaries", 200),
            CacheDecision::CacheForever
        );
    }

    #[test]
    fn failures_are_not_cached() {
        assert_eq!(
            cache_decision(
                "canvas",
                "/api/v1/courses/7/analytics/users/11/assignments",
                500
            ),
            CacheDecision::NoCache
        );
    }

    #[test]
    fn non_analytics_urls_are_not_cached() {
        assert_eq!(
            cache_decision("canvas", "/api/v1/courses/7/enrollments", 200),
            CacheDecision::NoCache
        );
    }

    #[test]
    fn other_services_are_not_cached() {
        assert_eq!(
            cache_decision("sws", "/api/v1/courses/7/analytics/student_summaries", 200),
            CacheDecision::NoCache
        );
    }
}
