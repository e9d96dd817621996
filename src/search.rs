//! # Document Search Module
//!
//! Keyword search over the stored documents. Queries are normalised the
//! same way document text is (Arabic letter forms folded, whitespace
//! collapsed), prefiltered in SQL with `LIKE`, then every match is ranked
//! in memory.
//!
//! ## Ranking
//!
//! Each query term scores one point per occurrence in the content and
//! three per occurrence in the title. Ties are broken by document quality.

mod error;
mod search_impl;

pub use error::SearchError;
pub use search_impl::{SearchOptions, SearchResult, search_documents};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{Grade, QualityScore};
    use crate::crawler::PageMetadata;
    use crate::index::{Database, Document};
    use crate::registry::DocumentCategory;

    fn document(url: &str, title: &str, content: &str, category: DocumentCategory, total: f64) -> Document {
        let domain = url::Url::parse(url).unwrap().host_str().unwrap().to_string();
        Document {
            id: 0,
            url: url.to_string(),
            domain: domain.clone(),
            title: title.to_string(),
            content: content.to_string(),
            content_hash: url.to_string(),
            category,
            confidence: 1.0,
            matched_terms: Vec::new(),
            quality: QualityScore {
                legal_density: total,
                structure: total,
                reliability: total,
                readability: total,
                total,
                grade: Grade::from_total(total),
            },
            metadata: PageMetadata {
                domain,
                ..Default::default()
            },
            fetch_method: "direct".to_string(),
            extraction_method: "heuristic".to_string(),
            created_at: 0,
            updated_at: 0,
        }
    }

    async fn seeded() -> Database {
        let db = Database::new_in_memory().await.unwrap();
        for doc in [
            document(
                "https://rc.majlis.ir/fa/law/show/1",
                "قانون مالیات‌های مستقیم",
                "ماده ۱ - اشخاص مشمول مالیات",
                DocumentCategory::Law,
                80.0,
            ),
            document(
                "https://www.dotic.ir/doc/2",
                "بخشنامه",
                "درباره مالیات بر ارزش افزوده و مالیات مشاغل",
                DocumentCategory::Directive,
                60.0,
            ),
            document(
                "https://eadl.ir/ruling/3",
                "رای وحدت رویه",
                "دیوان عدالت اداری",
                DocumentCategory::JudicialRuling,
                90.0,
            ),
        ] {
            db.upsert_document(&doc).await.unwrap();
        }
        db
    }

    #[tokio::test]
    async fn test_title_hits_rank_higher() {
        let db = seeded().await;
        let results = search_documents(&db, "مالیات", SearchOptions::default())
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        // Title (3) + content (1) beats two content hits
        assert_eq!(results[0].url, "https://rc.majlis.ir/fa/law/show/1");
        assert_eq!(results[0].score, 4.0);
        assert_eq!(results[1].score, 2.0);
        assert!(results[1].snippet.contains("مالیات"));
    }

    #[tokio::test]
    async fn test_best_match_found_among_many_weaker_ones() {
        let db = Database::new_in_memory().await.unwrap();
        for i in 0..510 {
            let doc = document(
                &format!("https://rc.majlis.ir/fa/law/show/{}", i),
                "مصوبه",
                "درباره مالیات",
                DocumentCategory::Law,
                90.0,
            );
            db.upsert_document(&doc).await.unwrap();
        }
        let best = document(
            "https://rc.majlis.ir/fa/law/show/best",
            "مالیات و مالیات",
            "مالیات مالیات مالیات",
            DocumentCategory::Law,
            10.0,
        );
        db.upsert_document(&best).await.unwrap();

        let results = search_documents(&db, "مالیات", SearchOptions::default())
            .await
            .unwrap();
        assert_eq!(results.len(), 10);
        assert_eq!(results[0].url, "https://rc.majlis.ir/fa/law/show/best");
        assert_eq!(results[0].score, 9.0);
        // Equal scores fall back to insertion order
        assert_eq!(results[1].url, "https://rc.majlis.ir/fa/law/show/0");
        assert_eq!(results[9].url, "https://rc.majlis.ir/fa/law/show/8");
    }

    #[tokio::test]
    async fn test_filters() {
        let db = seeded().await;

        let directives = search_documents(
            &db,
            "مالیات",
            SearchOptions {
                category: Some(DocumentCategory::Directive),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(directives.len(), 1);

        let by_source = search_documents(
            &db,
            "مالیات",
            SearchOptions {
                source_filter: Some("dotic.ir".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(by_source.len(), 1);
        assert_eq!(by_source[0].domain, "www.dotic.ir");

        let good = search_documents(
            &db,
            "مالیات",
            SearchOptions {
                min_quality: Some(70.0),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(good.len(), 1);
    }

    #[tokio::test]
    async fn test_arabic_query_letters_match() {
        let db = seeded().await;
        // Arabic yeh in the query, Persian yeh in the stored text
        let results = search_documents(&db, "د\u{64a}وان عدالت", SearchOptions::default())
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].category, DocumentCategory::JudicialRuling);
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let db = Database::new_in_memory().await.unwrap();
        let err = search_documents(&db, "  ", SearchOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::InvalidParameters(_)));
    }
}
