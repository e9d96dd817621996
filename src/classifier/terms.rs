//! Persian term lists used by keyword classification and quality scoring

use crate::registry::DocumentCategory;

const LAW: &[&str] = &[
    "قانون",
    "قوانین",
    "مجلس شورای اسلامی",
    "لایحه",
    "ماده واحده",
    "قانون اساسی",
];

const REGULATION: &[&str] = &[
    "آیین\u{200c}نامه",
    "آیین نامه",
    "آئین\u{200c}نامه",
    "اساسنامه",
    "نظامنامه",
    "شیوه\u{200c}نامه",
];

const RESOLUTION: &[&str] = &[
    "مصوبه",
    "مصوبات",
    "تصویب\u{200c}نامه",
    "هیئت وزیران",
    "هیأت وزیران",
    "هیات وزیران",
    "شورای عالی",
];

const DIRECTIVE: &[&str] = &["بخشنامه", "بخش\u{200c}نامه", "دستورالعمل", "ابلاغیه"];

const JUDICIAL_RULING: &[&str] = &[
    "رأی",
    "رای",
    "دادگاه",
    "دادنامه",
    "وحدت رویه",
    "دیوان عالی کشور",
    "دیوان عدالت اداری",
    "هیئت عمومی",
];

const TREATY: &[&str] = &[
    "موافقتنامه",
    "موافقت\u{200c}نامه",
    "کنوانسیون",
    "معاهده",
    "پروتکل",
    "یادداشت تفاهم",
    "عهدنامه",
];

const NEWS: &[&str] = &[
    "خبرگزاری",
    "گزارش",
    "اطلاعیه",
    "نشست",
    "دیدار",
    "گفت\u{200c}وگو",
    "سخنگو",
];

/// Vocabulary whose density marks a text as legal
pub const LEGAL_TERMS: &[&str] = &[
    "قانون",
    "قوانین",
    "ماده",
    "تبصره",
    "بند",
    "مصوب",
    "مقررات",
    "حقوق",
    "تعهد",
    "مجازات",
    "دادگاه",
    "وزارت",
    "اجرا",
    "لازم\u{200c}الاجرا",
    "مسئولیت",
    "قرارداد",
    "آیین\u{200c}نامه",
    "شورا",
];

/// Words that introduce the numbered parts of a legal text
pub const STRUCTURE_MARKERS: &[&str] = &["ماده", "تبصره", "بند", "فصل", "باب", "مصوب"];

/// Keywords for `category`; empty for `Unknown`
pub fn category_terms(category: DocumentCategory) -> &'static [&'static str] {
    match category {
        DocumentCategory::Law => LAW,
        DocumentCategory::Regulation => REGULATION,
        DocumentCategory::Resolution => RESOLUTION,
        DocumentCategory::Directive => DIRECTIVE,
        DocumentCategory::JudicialRuling => JUDICIAL_RULING,
        DocumentCategory::Treaty => TREATY,
        DocumentCategory::News => NEWS,
        DocumentCategory::Unknown => &[],
    }
}

/// Occurrences of `term` in `text` that start a word.
///
/// Suffixes are allowed, so plurals and adjectives still count, but a term
/// inside another word does not (`رای` in `برای`, `ماده` in `آماده`).
pub fn count_occurrences(text: &str, term: &str) -> usize {
    if term.is_empty() {
        return 0;
    }
    text.match_indices(term)
        .filter(|(i, _)| {
            text[..*i]
                .chars()
                .next_back()
                .is_none_or(|c| !c.is_alphabetic())
        })
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_category_but_unknown_has_terms() {
        for category in DocumentCategory::ALL {
            let terms = category_terms(category);
            assert_eq!(terms.is_empty(), category == DocumentCategory::Unknown, "{:?}", category);
        }
    }

    #[test]
    fn test_count_requires_word_start() {
        assert_eq!(count_occurrences("برای این رای", "رای"), 1);
        assert_eq!(count_occurrences("آماده است. ماده ۱", "ماده"), 1);
        assert_eq!(count_occurrences("قانون و قانونی", "قانون"), 2);
        assert_eq!(count_occurrences("(ماده ۲)", "ماده"), 1);
        assert_eq!(count_occurrences("", "قانون"), 0);
        assert_eq!(count_occurrences("قانون", ""), 0);
    }
}
