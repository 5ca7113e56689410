//! Suspicion classifier
//!
//! Decides from a member's profile text whether the member has to pass the
//! challenge. A profile is suspicious if it advertises a platform handle
//! (`@someone`) or a web link (`scheme://...`, `t.me/...`, `www....`).
//! The check is total: absent or empty text is clean.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

lazy_static! {
    static ref HANDLE_PATTERN: Regex =
        Regex::new(r"(?i)(?:^|[^a-z0-9_@.])@[a-z0-9_]{3,32}").expect("static pattern");
    static ref LINK_PATTERN: Regex = Regex::new(
        r"(?i)(?:\b[a-z][a-z0-9+.\-]*://\S+|\bt\.me/\S+|\bwww\.[a-z0-9\-]+\.\S+)"
    )
    .expect("static pattern");
}

/// Why a profile was considered suspicious
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuspicionReason {
    /// Mentions a platform handle
    Handle,
    /// Contains a web link
    Link,
}

impl SuspicionReason {
    pub fn describe(self) -> &'static str {
        match self {
            SuspicionReason::Handle => "contains handle",
            SuspicionReason::Link => "contains link",
        }
    }
}

impl fmt::Display for SuspicionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// Result of classifying a profile
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    pub reasons: BTreeSet<SuspicionReason>,
}

impl Classification {
    pub fn is_suspicious(&self) -> bool {
        !self.reasons.is_empty()
    }

    /// Human readable reasons, e.g. `["contains handle", "contains link"]`
    pub fn reason_strings(&self) -> Vec<&'static str> {
        self.reasons.iter().map(|r| r.describe()).collect()
    }
}

/// Classify a member's profile text
pub fn classify(profile_text: Option<&str>) -> Classification {
    let mut reasons = BTreeSet::new();
    let text = match profile_text {
        Some(text) if !text.trim().is_empty() => text,
        _ => return Classification { reasons },
    };

    if HANDLE_PATTERN.is_match(text) {
        reasons.insert(SuspicionReason::Handle);
    }
    if LINK_PATTERN.is_match(text) {
        reasons.insert(SuspicionReason::Link);
    }

    Classification { reasons }
}

/// Join reasons for display in a challenge message
pub fn describe_reasons(reasons: &[SuspicionReason]) -> String {
    reasons
        .iter()
        .map(|r| r.describe())
        .collect::<Vec<_>>()
        .join(" and ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_empty_and_absent_are_clean() {
        assert!(!classify(None).is_suspicious());
        assert!(!classify(Some("")).is_suspicious());
        assert!(!classify(Some("   \n")).is_suspicious());
    }

    #[test]
    fn test_handle_detected() {
        let c = classify(Some("hit me up @scammer123"));
        assert!(c.is_suspicious());
        assert_eq!(c.reason_strings(), vec!["contains handle"]);
    }

    #[test]
    fn test_handle_at_start_of_text() {
        assert!(classify(Some("@Crypto_Deals")).is_suspicious());
    }

    #[test]
    fn test_email_is_not_a_handle() {
        assert!(!classify(Some("write to alice@example.org")).is_suspicious());
    }

    #[test]
    fn test_link_case_insensitive() {
        let c = classify(Some("Best signals HTTPS://Example.com/join"));
        assert_eq!(c.reason_strings(), vec!["contains link"]);
        assert!(classify(Some("join T.ME/freecoins")).is_suspicious());
    }

    #[test]
    fn test_both_reasons() {
        let c = classify(Some("DM @promo or visit http://spam.example"));
        assert_eq!(
            c.reasons.iter().copied().collect::<Vec<_>>(),
            vec![SuspicionReason::Handle, SuspicionReason::Link]
        );
        assert_eq!(
            describe_reasons(&[SuspicionReason::Handle, SuspicionReason::Link]),
            "contains handle and contains link"
        );
    }

    #[test]
    fn test_plain_bio_is_clean() {
        assert!(!classify(Some("Rustacean, coffee, hiking. 日本語もOK")).is_suspicious());
    }

    proptest! {
        #[test]
        fn prop_classify_is_deterministic(s in any::<String>()) {
            let first = classify(Some(&s));
            prop_assert_eq!(first.clone(), classify(Some(&s)));
            prop_assert_eq!(first, classify(Some(&s)));
        }

        #[test]
        fn prop_text_without_markers_is_clean(s in "[a-zA-Z0-9 ,!?]{0,64}") {
            prop_assert!(!classify(Some(&s)).is_suspicious());
        }
    }
}
