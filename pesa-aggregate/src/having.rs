//! HAVING evaluation for in-memory aggregation
//!
//! Only one predicate shape is understood: `<alias> <op> <number>`. Anything
//! else, compound AND/OR predicates included, keeps every group.

use once_cell::sync::Lazy;
use pesa_core::Row;
use regex::Regex;
use std::fmt;

static HAVING_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(\w+)\s*(>=|<=|==|!=|<>|>|<|=)\s*(-?\d+(?:\.\d+)?)\s*$")
        .expect("Invalid HAVING regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HavingOp {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    Ne,
}

impl HavingOp {
    fn parse(op: &str) -> Option<Self> {
        match op {
            ">" => Some(HavingOp::Gt),
            ">=" => Some(HavingOp::Ge),
            "<" => Some(HavingOp::Lt),
            "<=" => Some(HavingOp::Le),
            "=" | "==" => Some(HavingOp::Eq),
            "!=" | "<>" => Some(HavingOp::Ne),
            _ => None,
        }
    }

    pub fn apply(self, left: f64, right: f64) -> bool {
        match self {
            HavingOp::Gt => left > right,
            HavingOp::Ge => left >= right,
            HavingOp::Lt => left < right,
            HavingOp::Le => left <= right,
            HavingOp::Eq => left == right,
            HavingOp::Ne => left != right,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            HavingOp::Gt => ">",
            HavingOp::Ge => ">=",
            HavingOp::Lt => "<",
            HavingOp::Le => "<=",
            HavingOp::Eq => "=",
            HavingOp::Ne => "!=",
        }
    }
}

/// A parsed HAVING clause.
#[derive(Debug, Clone, PartialEq)]
pub enum HavingFilter {
    Predicate {
        alias: String,
        op: HavingOp,
        threshold: f64,
    },
    /// Text outside the supported shape. Keeps every group.
    PassThrough { text: String },
}

impl HavingFilter {
    pub fn parse(text: &str) -> Self {
        let parsed = HAVING_PATTERN.captures(text).and_then(|caps| {
            let op = HavingOp::parse(&caps[2])?;
            let threshold = caps[3].parse::<f64>().ok()?;
            Some(HavingFilter::Predicate {
                alias: caps[1].to_string(),
                op,
                threshold,
            })
        });

        match parsed {
            Some(filter) => filter,
            None => {
                tracing::warn!(
                    having = %text,
                    "Cannot evaluate HAVING clause in memory; keeping all groups"
                );
                HavingFilter::PassThrough {
                    text: text.to_string(),
                }
            }
        }
    }

    pub fn is_pass_through(&self) -> bool {
        matches!(self, HavingFilter::PassThrough { .. })
    }

    /// Whether a computed group row survives the filter.
    ///
    /// A missing or null alias reads as 0. A value with no numeric view keeps
    /// the group.
    pub fn matches(&self, row: &Row) -> bool {
        match self {
            HavingFilter::PassThrough { .. } => true,
            HavingFilter::Predicate {
                alias,
                op,
                threshold,
            } => {
                let value = row.get_or_null(alias);
                let actual = if value.is_null() {
                    0.0
                } else {
                    match value.as_f64() {
                        Some(actual) => actual,
                        None => return true,
                    }
                };
                op.apply(actual, *threshold)
            }
        }
    }
}

impl fmt::Display for HavingFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HavingFilter::Predicate {
                alias,
                op,
                threshold,
            } => write!(f, "{} {} {}", alias, op.symbol(), threshold),
            HavingFilter::PassThrough { text } => f.write_str(text),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pesa_core::Value;

    fn group(count: i64) -> Row {
        Row::new().with("category_id", "cat-food").with("count_all", count)
    }

    #[test]
    fn test_parse_simple_predicate() {
        assert_eq!(
            HavingFilter::parse("count_all > 2"),
            HavingFilter::Predicate {
                alias: "count_all".to_string(),
                op: HavingOp::Gt,
                threshold: 2.0,
            }
        );
        assert_eq!(
            HavingFilter::parse("  sum_amount<>-10.5 "),
            HavingFilter::Predicate {
                alias: "sum_amount".to_string(),
                op: HavingOp::Ne,
                threshold: -10.5,
            }
        );
    }

    #[test]
    fn test_compound_predicate_passes_through() {
        let filter = HavingFilter::parse("count_all > 2 AND x < 5");
        assert!(filter.is_pass_through());
        assert!(filter.matches(&group(0)));
    }

    #[test]
    fn test_matches_threshold() {
        let filter = HavingFilter::parse("count_all > 2");
        assert!(filter.matches(&group(3)));
        assert!(!filter.matches(&group(2)));
    }

    #[test]
    fn test_missing_alias_reads_as_zero() {
        let filter = HavingFilter::parse("avg_amount >= 0");
        assert!(filter.matches(&group(1)));
        let filter = HavingFilter::parse("avg_amount > 0");
        assert!(!filter.matches(&Row::new().with("avg_amount", Value::Null)));
    }

    #[test]
    fn test_non_numeric_value_keeps_group() {
        let filter = HavingFilter::parse("category_id > 1");
        assert!(filter.matches(&group(1)));
    }

    #[test]
    fn test_every_operator() {
        let row = group(5);
        let cases = [
            ("count_all > 4", true),
            ("count_all >= 5", true),
            ("count_all < 5", false),
            ("count_all <= 5", true),
            ("count_all = 5", true),
            ("count_all == 4", false),
            ("count_all != 5", false),
            ("count_all <> 4", true),
        ];
        for (text, expected) in cases {
            assert_eq!(HavingFilter::parse(text).matches(&row), expected, "{}", text);
        }
    }
}
