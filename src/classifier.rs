//! # Classification and Scoring Module
//!
//! Assigns a category and a quality score to extracted legal text.
//!
//! Categorisation counts Persian category terms (title hits weigh triple).
//! When a model classifier is configured its prediction is blended into the
//! keyword shares; when nothing matches at all the source's usual category
//! is used. Quality is a weighted sum of legal-term density, structure,
//! source reliability and a readability approximation.

mod config;
mod error;
mod keywords;
mod model;
mod quality;
pub mod terms;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub use config::{ClassifierConfig, ClassifierConfigBuilder};
pub use error::ClassifyError;
pub use keywords::{Classification, ClassificationBasis, classify_keywords};
pub use model::{LlmClassifier, ModelClassifier, ModelPrediction, parse_prediction};
pub use quality::{Grade, QualityScore, QualityWeights, score_quality};

use crate::registry::{DEFAULT_RELIABILITY, DocumentCategory, LegalSource};

/// Confidence given to a category taken from the source table alone
const SOURCE_DEFAULT_CONFIDENCE: f64 = 0.3;

/// Category and quality for one document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub classification: Classification,
    pub quality: QualityScore,
}

/// Keyword classifier with an optional model blended in
#[derive(Clone, Default)]
pub struct Classifier {
    config: ClassifierConfig,
    model: Option<Arc<dyn ModelClassifier>>,
}

impl std::fmt::Debug for Classifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Classifier")
            .field("config", &self.config)
            .field("model", &self.model.is_some())
            .finish()
    }
}

impl Classifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self {
            config,
            model: None,
        }
    }

    /// Blend predictions from `model` into keyword results
    pub fn with_model(mut self, model: impl ModelClassifier + 'static) -> Self {
        self.model = Some(Arc::new(model));
        self
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    /// Categorise a document
    ///
    /// Model failures are logged and the keyword result is kept.
    pub async fn classify(
        &self,
        title: &str,
        content: &str,
        source: Option<&LegalSource>,
    ) -> Classification {
        let mut result = classify_keywords(title, content);

        if let Some(model) = &self.model {
            match model.predict(title, content).await {
                Ok(prediction) => {
                    debug!(?prediction, "Blending model prediction");
                    result = blend(result, prediction, self.config.model_weight);
                }
                Err(e) => warn!("Model classification failed, keeping keyword result: {}", e),
            }
        }

        if result.category == DocumentCategory::Unknown {
            if let Some(source) = source {
                result.category = source.category;
                result.confidence = SOURCE_DEFAULT_CONFIDENCE;
                result.basis = ClassificationBasis::SourceDefault;
            }
        }

        result
    }

    /// Quality score using the configured weights
    pub fn score(&self, content: &str, reliability: f64) -> QualityScore {
        score_quality(content, reliability, &self.config.weights)
    }

    /// Classify and score in one go
    pub async fn assess(
        &self,
        title: &str,
        content: &str,
        source: Option<&LegalSource>,
    ) -> Assessment {
        let classification = self.classify(title, content, source).await;
        let reliability = source.map(|s| s.reliability).unwrap_or(DEFAULT_RELIABILITY);
        let quality = self.score(content, reliability);
        Assessment {
            classification,
            quality,
        }
    }
}

/// Mix keyword shares with the model's vote for one category
fn blend(keywords: Classification, prediction: ModelPrediction, weight: f64) -> Classification {
    let mut scores: BTreeMap<DocumentCategory, f64> = keywords
        .scores
        .iter()
        .map(|(&c, &s)| (c, s * (1.0 - weight)))
        .collect();
    *scores.entry(prediction.category).or_insert(0.0) += prediction.confidence * weight;

    let (category, confidence) = scores
        .iter()
        .fold((DocumentCategory::Unknown, 0.0), |best, (&c, &s)| {
            if s > best.1 { (c, s) } else { best }
        });

    Classification {
        category,
        confidence,
        scores,
        matched_terms: keywords.matched_terms,
        basis: ClassificationBasis::Blended,
    }
}
