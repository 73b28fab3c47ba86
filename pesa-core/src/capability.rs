//! Capability features and the unsupported-syntax classifier
//!
//! Older remote store builds reject aggregate syntax with parser messages
//! such as `Expected identifier near 'COUNT'`. Whether a failure means
//! "this build cannot do X" is decided here, from a fixed signature table,
//! and nowhere else.

use crate::aggregate::FunctionKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A relational feature the remote store may or may not support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    Count,
    Sum,
    Avg,
    Min,
    Max,
    GroupBy,
    Having,
}

impl Feature {
    pub const ALL: [Feature; 7] = [
        Feature::Count,
        Feature::Sum,
        Feature::Avg,
        Feature::Min,
        Feature::Max,
        Feature::GroupBy,
        Feature::Having,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Feature::Count => "count",
            Feature::Sum => "sum",
            Feature::Avg => "avg",
            Feature::Min => "min",
            Feature::Max => "max",
            Feature::GroupBy => "group_by",
            Feature::Having => "having",
        }
    }
}

impl From<FunctionKind> for Feature {
    fn from(kind: FunctionKind) -> Self {
        match kind {
            FunctionKind::Count => Feature::Count,
            FunctionKind::Sum => Feature::Sum,
            FunctionKind::Avg => Feature::Avg,
            FunctionKind::Min => Feature::Min,
            FunctionKind::Max => Feature::Max,
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// CLASSIFIER
// ============================================================================

/// Parser-failure markers; at least one must appear alongside the keyword.
pub const SYNTAX_MARKERS: &[&str] = &["syntax", "expected identifier"];

/// A failure text signals that `feature` is unsupported when its lowercase
/// form contains `keyword` and any of `markers`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnsupportedSignature {
    pub feature: Feature,
    pub keyword: &'static str,
    pub markers: &'static [&'static str],
}

/// Only aggregate functions are classified. GROUP BY and HAVING support is
/// known only from the probe; clause keywords also occur in column names.
pub const UNSUPPORTED_SIGNATURES: &[UnsupportedSignature] = &[
    UnsupportedSignature { feature: Feature::Count, keyword: "count", markers: SYNTAX_MARKERS },
    UnsupportedSignature { feature: Feature::Sum, keyword: "sum", markers: SYNTAX_MARKERS },
    UnsupportedSignature { feature: Feature::Avg, keyword: "avg", markers: SYNTAX_MARKERS },
    UnsupportedSignature { feature: Feature::Min, keyword: "min", markers: SYNTAX_MARKERS },
    UnsupportedSignature { feature: Feature::Max, keyword: "max", markers: SYNTAX_MARKERS },
];

impl UnsupportedSignature {
    /// `lowered` must already be lowercase.
    fn matches(&self, lowered: &str) -> bool {
        lowered.contains(self.keyword) && self.markers.iter().any(|m| lowered.contains(m))
    }
}

/// Whether `message` is the store's way of saying `feature` is unsupported.
pub fn is_unsupported(feature: Feature, message: &str) -> bool {
    let lowered = message.to_lowercase();
    UNSUPPORTED_SIGNATURES
        .iter()
        .filter(|sig| sig.feature == feature)
        .any(|sig| sig.matches(&lowered))
}

/// First of `candidates` that `message` marks as unsupported.
pub fn classify_unsupported(message: &str, candidates: &[Feature]) -> Option<Feature> {
    let lowered = message.to_lowercase();
    candidates.iter().copied().find(|feature| {
        UNSUPPORTED_SIGNATURES
            .iter()
            .filter(|sig| sig.feature == *feature)
            .any(|sig| sig.matches(&lowered))
    })
}

// ============================================================================
// CAPABILITY MAP
// ============================================================================

/// Diagnostic snapshot of what the remote store accepted when probed.
///
/// Never cached and never consulted by the per-call fallback decision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityMap {
    pub count: bool,
    pub sum: bool,
    pub avg: bool,
    pub min: bool,
    pub max: bool,
    pub group_by: bool,
    pub having: bool,
}

impl CapabilityMap {
    pub fn all_supported() -> Self {
        Self {
            count: true,
            sum: true,
            avg: true,
            min: true,
            max: true,
            group_by: true,
            having: true,
        }
    }

    pub fn supports(&self, feature: Feature) -> bool {
        match feature {
            Feature::Count => self.count,
            Feature::Sum => self.sum,
            Feature::Avg => self.avg,
            Feature::Min => self.min,
            Feature::Max => self.max,
            Feature::GroupBy => self.group_by,
            Feature::Having => self.having,
        }
    }

    pub fn set(&mut self, feature: Feature, supported: bool) {
        let slot = match feature {
            Feature::Count => &mut self.count,
            Feature::Sum => &mut self.sum,
            Feature::Avg => &mut self.avg,
            Feature::Min => &mut self.min,
            Feature::Max => &mut self.max,
            Feature::GroupBy => &mut self.group_by,
            Feature::Having => &mut self.having,
        };
        *slot = supported;
    }

    pub fn unsupported(&self) -> Vec<Feature> {
        Feature::ALL
            .into_iter()
            .filter(|feature| !self.supports(*feature))
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.unsupported().is_empty()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expected_identifier_near_count() {
        assert!(is_unsupported(
            Feature::Count,
            "Parse error: Expected identifier near 'COUNT'"
        ));
    }

    #[test]
    fn test_syntax_error_mentioning_sum() {
        assert!(is_unsupported(Feature::Sum, "Syntax error at SUM(amount)"));
        assert!(!is_unsupported(Feature::Count, "Syntax error at SUM(amount)"));
    }

    #[test]
    fn test_unrelated_failures_are_not_capability_gaps() {
        assert!(!is_unsupported(Feature::Count, "Table 'count_log' does not exist"));
        assert!(!is_unsupported(Feature::Count, "connection reset by peer"));
        assert!(!is_unsupported(Feature::Sum, "syntax error near WHERE"));
    }

    #[test]
    fn test_classify_picks_first_matching_candidate() {
        let message = "syntax error: unexpected AVG";
        assert_eq!(
            classify_unsupported(message, &[Feature::Count, Feature::Avg]),
            Some(Feature::Avg)
        );
        assert_eq!(classify_unsupported(message, &[Feature::Count]), None);
    }

    #[test]
    fn test_every_function_has_a_signature() {
        for kind in FunctionKind::ALL {
            let feature = Feature::from(kind);
            assert!(
                UNSUPPORTED_SIGNATURES.iter().any(|sig| sig.feature == feature),
                "no signature for {}",
                feature
            );
        }
    }

    #[test]
    fn test_clause_keywords_never_classify() {
        let message = "Syntax error near 'transaction_group_id'";
        assert!(!is_unsupported(Feature::GroupBy, message));
        assert!(!is_unsupported(Feature::Having, "syntax error near HAVING"));
        assert_eq!(
            classify_unsupported(message, &[Feature::Sum, Feature::GroupBy]),
            None
        );
    }

    #[test]
    fn test_capability_map_set_and_unsupported() {
        let mut map = CapabilityMap::all_supported();
        assert!(map.is_complete());
        map.set(Feature::Having, false);
        map.set(Feature::Count, false);
        assert_eq!(map.unsupported(), vec![Feature::Count, Feature::Having]);
        assert!(!map.supports(Feature::Having));
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Text without any syntax marker never triggers a fallback.
        #[test]
        fn prop_no_marker_no_fallback(text in "[a-z ']{0,40}") {
            prop_assume!(!text.contains("syntax") && !text.contains("expected identifier"));
            for feature in Feature::ALL {
                prop_assert!(!is_unsupported(feature, &text));
            }
        }

        /// Classification ignores case.
        #[test]
        fn prop_case_insensitive(upper in any::<bool>()) {
            let base = "Syntax Error near COUNT(*)";
            let message = if upper { base.to_uppercase() } else { base.to_lowercase() };
            prop_assert!(is_unsupported(Feature::Count, &message));
        }
    }
}
