//! Spending categories and the untrusted parse from model output

use serde::{Deserialize, Serialize};

/// Closed set of spending categories the model is allowed to pick from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Category {
    #[serde(rename = "Food & Dining")]
    FoodAndDining,
    #[serde(rename = "Shopping")]
    Shopping,
    #[serde(rename = "Transportation")]
    Transportation,
    #[serde(rename = "Bills & Utilities")]
    BillsAndUtilities,
    #[serde(rename = "Entertainment")]
    Entertainment,
    #[serde(rename = "Healthcare")]
    Healthcare,
    #[serde(rename = "Travel")]
    Travel,
    #[serde(rename = "Education")]
    Education,
    #[serde(rename = "Personal Care")]
    PersonalCare,
    #[serde(rename = "Home & Garden")]
    HomeAndGarden,
    #[serde(rename = "Gifts & Donations")]
    GiftsAndDonations,
    #[serde(rename = "Business Expenses")]
    BusinessExpenses,
    #[serde(rename = "Other")]
    Other,
}

impl Category {
    pub const ALL: [Category; 13] = [
        Category::FoodAndDining,
        Category::Shopping,
        Category::Transportation,
        Category::BillsAndUtilities,
        Category::Entertainment,
        Category::Healthcare,
        Category::Travel,
        Category::Education,
        Category::PersonalCare,
        Category::HomeAndGarden,
        Category::GiftsAndDonations,
        Category::BusinessExpenses,
        Category::Other,
    ];

    /// Canonical label, as shown to the model and stored in the database
    pub fn label(&self) -> &'static str {
        match self {
            Category::FoodAndDining => "Food & Dining",
            Category::Shopping => "Shopping",
            Category::Transportation => "Transportation",
            Category::BillsAndUtilities => "Bills & Utilities",
            Category::Entertainment => "Entertainment",
            Category::Healthcare => "Healthcare",
            Category::Travel => "Travel",
            Category::Education => "Education",
            Category::PersonalCare => "Personal Care",
            Category::HomeAndGarden => "Home & Garden",
            Category::GiftsAndDonations => "Gifts & Donations",
            Category::BusinessExpenses => "Business Expenses",
            Category::Other => "Other",
        }
    }

    /// Parse a free-text label from the model. Untrusted input: exact
    /// case-insensitive match first, then substring closest-match either
    /// direction. Returns None when nothing matches; callers fall back
    /// to `Other`.
    pub fn parse_label(label: &str) -> Option<Category> {
        let needle = label.trim().to_lowercase();
        if needle.is_empty() {
            return None;
        }
        for cat in Category::ALL {
            if cat.label().to_lowercase() == needle {
                return Some(cat);
            }
        }
        for cat in Category::ALL {
            let hay = cat.label().to_lowercase();
            if hay.contains(&needle) || needle.contains(&hay) {
                return Some(cat);
            }
        }
        None
    }

    /// Comma-separated labels for the prompt template
    pub fn prompt_list() -> String {
        Category::ALL
            .iter()
            .map(|c| c.label())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// What the categorizer decided for one transaction
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Categorization {
    pub category: Category,
    pub subcategory: String,
    /// Model self-reported confidence, 0.0 - 1.0
    pub confidence: f64,
}

impl Categorization {
    /// Fallback used when the model call failed or its output was
    /// unrecognizable. Never aborts the batch.
    pub fn fallback() -> Self {
        Self {
            category: Category::Other,
            subcategory: "Uncategorized".to_string(),
            confidence: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_label_roundtrip() {
        for cat in Category::ALL {
            assert_eq!(Category::parse_label(cat.label()), Some(cat));
        }
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(
            Category::parse_label("food & dining"),
            Some(Category::FoodAndDining)
        );
        assert_eq!(Category::parse_label("TRAVEL"), Some(Category::Travel));
    }

    #[test]
    fn test_closest_match_substring() {
        // Model answers "Food" -- substring of "Food & Dining"
        assert_eq!(Category::parse_label("Food"), Some(Category::FoodAndDining));
        // Model answers with extra words around a known label
        assert_eq!(
            Category::parse_label("probably Entertainment expenses"),
            Some(Category::Entertainment)
        );
    }

    #[test]
    fn test_unrecognized_is_none() {
        assert_eq!(Category::parse_label("Cryptocurrency"), None);
        assert_eq!(Category::parse_label(""), None);
        assert_eq!(Category::parse_label("   "), None);
    }

    #[test]
    fn test_prompt_list_contains_all() {
        let list = Category::prompt_list();
        for cat in Category::ALL {
            assert!(list.contains(cat.label()));
        }
    }

    #[test]
    fn test_fallback_is_other() {
        let f = Categorization::fallback();
        assert_eq!(f.category, Category::Other);
        assert_eq!(f.confidence, 0.0);
    }
}
