//! Reference seed data

use chrono::{DateTime, Utc};
use pesa_core::{DefaultUserSeed, Row, Value};
use serde_json::json;

/// A default expense category shared by every user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategorySeed {
    pub id: &'static str,
    pub name: &'static str,
    pub icon: &'static str,
    pub color: &'static str,
    /// Lowercase words the categoriser matches against descriptions.
    pub keywords: &'static [&'static str],
}

impl CategorySeed {
    /// The `categories` row for this seed. Keywords are stored as a JSON
    /// array string; `user_id` is null for shared categories.
    pub fn row(&self) -> Row {
        Row::new()
            .with("id", self.id)
            .with("user_id", Value::Null)
            .with("name", self.name)
            .with("icon", self.icon)
            .with("color", self.color)
            .with("keywords", json!(self.keywords).to_string())
            .with("is_default", true)
    }
}

pub const DEFAULT_CATEGORIES: &[CategorySeed] = &[
    CategorySeed {
        id: "cat-food",
        name: "Food & Dining",
        icon: "🍔",
        color: "#FF6B6B",
        keywords: &[
            "food",
            "restaurant",
            "dining",
            "lunch",
            "dinner",
            "breakfast",
            "nyama",
            "choma",
        ],
    },
    CategorySeed {
        id: "cat-transport",
        name: "Transport",
        icon: "🚗",
        color: "#4ECDC4",
        keywords: &["taxi", "bus", "matatu", "uber", "fuel", "transport", "travel"],
    },
    CategorySeed {
        id: "cat-shopping",
        name: "Shopping",
        icon: "🛍️",
        color: "#95E1D3",
        keywords: &["shop", "store", "mall", "clothing", "electronics", "supermarket"],
    },
    CategorySeed {
        id: "cat-bills",
        name: "Bills & Utilities",
        icon: "📱",
        color: "#F38181",
        keywords: &[
            "bill",
            "electricity",
            "water",
            "internet",
            "phone",
            "utility",
            "kplc",
            "nairobi water",
        ],
    },
    CategorySeed {
        id: "cat-entertainment",
        name: "Entertainment",
        icon: "🎬",
        color: "#AA96DA",
        keywords: &["movie", "cinema", "game", "entertainment", "music", "showmax", "netflix"],
    },
    CategorySeed {
        id: "cat-health",
        name: "Health & Fitness",
        icon: "⚕️",
        color: "#FCBAD3",
        keywords: &["hospital", "pharmacy", "doctor", "medicine", "gym", "health", "clinic"],
    },
    CategorySeed {
        id: "cat-education",
        name: "Education",
        icon: "📚",
        color: "#A8D8EA",
        keywords: &["school", "books", "tuition", "education", "course", "university"],
    },
    CategorySeed {
        id: "cat-airtime",
        name: "Airtime & Data",
        icon: "📞",
        color: "#FFFFD2",
        keywords: &["airtime", "data", "bundles", "safaricom", "airtel", "telkom"],
    },
    CategorySeed {
        id: "cat-transfers",
        name: "Money Transfer",
        icon: "💸",
        color: "#FEC8D8",
        keywords: &["transfer", "send money", "mpesa", "paybill", "till"],
    },
    CategorySeed {
        id: "cat-savings",
        name: "Savings & Investments",
        icon: "💰",
        color: "#957DAD",
        keywords: &[
            "savings",
            "investment",
            "deposit",
            "savings account",
            "mshwari",
            "kcb mpesa",
        ],
    },
    CategorySeed {
        id: "cat-other",
        name: "Other",
        icon: "📌",
        color: "#D4A5A5",
        keywords: &[],
    },
];

/// The `users` row for the configured default user.
pub fn default_user_row(seed: &DefaultUserSeed, id: &str, created_at: DateTime<Utc>) -> Row {
    Row::new()
        .with("id", id)
        .with("email", seed.email.as_str())
        .with("password_hash", seed.password_hash.as_str())
        .with("name", seed.name.as_str())
        .with("created_at", created_at.to_rfc3339())
        .with("preferences", json!({ "default_currency": "KES" }).to_string())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::{CATEGORIES, USERS};
    use std::collections::HashSet;

    #[test]
    fn test_category_ids_are_unique() {
        let ids: HashSet<&str> = DEFAULT_CATEGORIES.iter().map(|c| c.id).collect();
        assert_eq!(ids.len(), DEFAULT_CATEGORIES.len());
        assert_eq!(DEFAULT_CATEGORIES.len(), 11);
    }

    #[test]
    fn test_category_row_matches_table() {
        let row = DEFAULT_CATEGORIES[0].row();
        let columns: Vec<&str> = row.column_names().collect();
        assert_eq!(columns, CATEGORIES.column_names());
        assert_eq!(row.get("is_default"), Some(&Value::Bool(true)));
        assert_eq!(row.get("user_id"), Some(&Value::Null));
    }

    #[test]
    fn test_keywords_are_a_json_array() {
        let other = DEFAULT_CATEGORIES.iter().find(|c| c.id == "cat-other").unwrap();
        assert_eq!(other.row().get("keywords"), Some(&Value::from("[]")));

        let food = DEFAULT_CATEGORIES[0].row();
        let parsed: Vec<String> =
            serde_json::from_str(food.get("keywords").and_then(Value::as_str).unwrap()).unwrap();
        assert_eq!(parsed[0], "food");
        assert_eq!(parsed.len(), 8);
    }

    #[test]
    fn test_default_user_row() {
        let seed = DefaultUserSeed {
            email: "owner@example.com".to_string(),
            name: "Owner".to_string(),
            password_hash: "$2b$12$abc".to_string(),
        };
        let created_at = DateTime::parse_from_rfc3339("2024-01-02T03:04:05Z")
            .unwrap()
            .with_timezone(&Utc);
        let row = default_user_row(&seed, "user-1", created_at);

        let columns: Vec<&str> = row.column_names().collect();
        assert_eq!(columns, USERS.column_names());
        assert_eq!(
            row.get("created_at"),
            Some(&Value::from("2024-01-02T03:04:05+00:00"))
        );
        assert_eq!(
            row.get("preferences"),
            Some(&Value::from(r#"{"default_currency":"KES"}"#))
        );
    }
}
