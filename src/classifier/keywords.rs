//! Keyword classification

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::classifier::terms::{category_terms, count_occurrences};
use crate::crawler::normalize_persian;
use crate::registry::DocumentCategory;

/// Title hits count this many times over content hits
const TITLE_WEIGHT: usize = 3;

/// What the final category was decided from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationBasis {
    Keywords,
    /// Keyword shares blended with a model prediction
    Blended,
    /// Nothing matched; the source's usual category was used
    SourceDefault,
}

/// Category assignment with its evidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub category: DocumentCategory,

    /// 0 to 1
    pub confidence: f64,

    /// Share of the weighted hits per category
    pub scores: BTreeMap<DocumentCategory, f64>,

    /// Terms that matched, in first-match order
    pub matched_terms: Vec<String>,

    pub basis: ClassificationBasis,
}

impl Classification {
    /// No evidence at all
    pub fn unknown() -> Self {
        Self {
            category: DocumentCategory::Unknown,
            confidence: 0.0,
            scores: BTreeMap::new(),
            matched_terms: Vec::new(),
            basis: ClassificationBasis::Keywords,
        }
    }
}

/// Classify by counting category terms; title matches weigh triple
pub fn classify_keywords(title: &str, content: &str) -> Classification {
    let title = normalize_persian(title);
    let content = normalize_persian(content);

    let mut hits: Vec<(DocumentCategory, usize)> = Vec::new();
    let mut matched_terms: Vec<String> = Vec::new();

    for category in DocumentCategory::ALL {
        let mut category_hits = 0;
        for term in category_terms(category) {
            let count = count_occurrences(&content, term)
                + TITLE_WEIGHT * count_occurrences(&title, term);
            if count > 0 {
                category_hits += count;
                if !matched_terms.iter().any(|t| t == term) {
                    matched_terms.push(term.to_string());
                }
            }
        }
        if category_hits > 0 {
            hits.push((category, category_hits));
        }
    }

    let total: usize = hits.iter().map(|(_, n)| n).sum();
    if total == 0 {
        return Classification::unknown();
    }

    // Ties go to the category listed first
    let mut best = hits[0];
    for &candidate in &hits[1..] {
        if candidate.1 > best.1 {
            best = candidate;
        }
    }

    let scores = hits
        .iter()
        .map(|&(category, n)| (category, n as f64 / total as f64))
        .collect();

    Classification {
        category: best.0,
        confidence: best.1 as f64 / total as f64,
        scores,
        matched_terms,
        basis: ClassificationBasis::Keywords,
    }
}
