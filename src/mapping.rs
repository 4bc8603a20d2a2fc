//! Maps document metadata to category folders

use serde::{Deserialize, Serialize};

/// Category folder a document is filed under.
///
/// Closed set; every document lands in exactly one of these folders
/// inside its client folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    Permanent,
    AccountingPayroll,
    ConsultingSpecialProjects,
    Other,
    Tax,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Permanent => "_Permanent",
            Category::AccountingPayroll => "Accounting & Payroll",
            Category::ConsultingSpecialProjects => "Consulting & Special Projects",
            Category::Other => "Other",
            Category::Tax => "Tax",
        }
    }

    /// All category folders, in the order they are created under a client folder.
    pub fn all() -> [Category; 5] {
        [
            Category::Permanent,
            Category::AccountingPayroll,
            Category::ConsultingSpecialProjects,
            Category::Other,
            Category::Tax,
        ]
    }
}

/// Determine the category folder from File Section, Document Type and Description.
///
/// Total over arbitrary input: values are trimmed and lowercased before
/// comparison, and anything unrecognized falls back to `Other`.
pub fn classify(file_section: &str, _document_type: &str, _description: &str) -> Category {
    let file_section = file_section.trim().to_lowercase();

    match file_section.as_str() {
        "bookkeeping" => Category::AccountingPayroll,
        // "clientflow" and every other section currently map to Other
        _ => Category::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bookkeeping_maps_to_accounting() {
        assert_eq!(
            classify("Bookkeeping", "Invoice", "Q1"),
            Category::AccountingPayroll
        );
        assert_eq!(
            classify("  bookkeeping  ", "", ""),
            Category::AccountingPayroll
        );
    }

    #[test]
    fn test_clientflow_maps_to_other() {
        assert_eq!(classify("Clientflow", "Memo", ""), Category::Other);
    }

    #[test]
    fn test_classify_is_total() {
        // Empty, garbage, and unicode input all degrade to Other
        assert_eq!(classify("", "", ""), Category::Other);
        assert_eq!(classify("unknown section", "???", "!!"), Category::Other);
        assert_eq!(classify("日本語", "", ""), Category::Other);
        let known = Category::all();
        assert!(known.contains(&classify("anything", "at", "all")));
    }

    #[test]
    fn test_category_labels() {
        assert_eq!(Category::Permanent.as_str(), "_Permanent");
        assert_eq!(Category::Tax.as_str(), "Tax");
        assert_eq!(Category::all().len(), 5);
    }
}
