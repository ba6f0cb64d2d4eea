use crate::models::CategorySet;

/// Categories whose keywords occur in a transcript
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryHint {
    pub code: String,
    pub matched: Vec<String>,
}

/// Match category keywords against transcript text
///
/// Matching is case-insensitive substring search. Hints are ordered by the
/// number of distinct keywords matched, then by category order, and capped at
/// `max_hints`. They are suggestions for the model, never a classification.
pub fn category_hints(text: &str, categories: &CategorySet, max_hints: usize) -> Vec<CategoryHint> {
    let haystack = text.to_lowercase();
    let mut hints: Vec<CategoryHint> = categories
        .iter()
        .filter_map(|def| {
            let matched: Vec<String> = def
                .keywords
                .iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty() && haystack.contains(k.as_str()))
                .collect();
            (!matched.is_empty()).then(|| CategoryHint {
                code: def.code.clone(),
                matched,
            })
        })
        .collect();

    // Stable sort keeps category order among equal counts
    hints.sort_by(|a, b| b.matched.len().cmp(&a.matched.len()));
    hints.truncate(max_hints);
    hints
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hinglish_lead_quality_hint() {
        let categories = CategorySet::default();
        let hints = category_hints(
            "ग्राहक ने कहा leads galat city se aa rahi hain",
            &categories,
            3,
        );
        assert_eq!(hints[0].code, "LEAD_QUALITY");
        assert_eq!(hints[0].matched, vec!["galat", "leads"]);
    }

    #[test]
    fn test_no_hints_and_cap() {
        let categories = CategorySet::default();
        assert!(category_hints("namaste", &categories, 3).is_empty());

        let text = "payment refund invoice, app login error, cancel subscription renewal";
        let hints = category_hints(text, &categories, 2);
        assert_eq!(hints.len(), 2);
        assert!(hints[0].matched.len() >= hints[1].matched.len());
    }
}
