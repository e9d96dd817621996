//! Model-backed category prediction

use async_trait::async_trait;
use rig::completion::{AssistantContent, CompletionModel};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::classifier::error::ClassifyError;
use crate::registry::DocumentCategory;

const PREAMBLE: &str = "You classify Iranian legal and government texts written in Persian. \
Answer with a single JSON object and nothing else, of the form \
{\"category\": \"<category>\", \"confidence\": <number between 0 and 1>}. \
<category> is one of: law, regulation, resolution, directive, judicial_ruling, treaty, news, unknown. \
law = acts of parliament; regulation = executive by-laws (آیین‌نامه); resolution = cabinet or council \
resolutions (مصوبه); directive = circulars and instructions (بخشنامه، دستورالعمل); \
judicial_ruling = court rulings and precedents; treaty = international agreements; \
news = news and announcements.";

/// A model's opinion on a document
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPrediction {
    pub category: DocumentCategory,
    pub confidence: f64,
}

/// Anything that can predict a category for a document
#[async_trait]
pub trait ModelClassifier: Send + Sync {
    async fn predict(&self, title: &str, content: &str) -> Result<ModelPrediction, ClassifyError>;
}

/// Classifier backed by a rig completion model
#[derive(Debug, Clone)]
pub struct LlmClassifier<M: CompletionModel> {
    model: M,
    max_chars: usize,
}

impl<M: CompletionModel> LlmClassifier<M> {
    pub fn new(model: M) -> Self {
        Self {
            model,
            max_chars: 4000,
        }
    }

    /// Limit how much of the document is sent
    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }
}

#[async_trait]
impl<M> ModelClassifier for LlmClassifier<M>
where
    M: CompletionModel + 'static,
{
    #[instrument(skip_all)]
    async fn predict(&self, title: &str, content: &str) -> Result<ModelPrediction, ClassifyError> {
        let excerpt: String = content.chars().take(self.max_chars).collect();
        let prompt = format!("Title: {}\n\nText:\n{}", title, excerpt);

        let response = self
            .model
            .completion_request(prompt)
            .preamble(PREAMBLE.to_string())
            .temperature(0.0)
            .send()
            .await?;

        let reply = response
            .choice
            .iter()
            .map(|c| match c {
                AssistantContent::Text(t) => t.text.clone(),
                _ => String::new(),
            })
            .collect::<Vec<String>>()
            .join("\n");
        debug!(reply = %reply, "Model replied");

        parse_prediction(&reply)
    }
}

#[derive(Deserialize)]
struct RawPrediction {
    category: String,
    #[serde(default)]
    confidence: Option<f64>,
}

/// Parse a reply that contains a `{category, confidence}` object somewhere,
/// possibly inside a code fence. Persian category labels are accepted too.
pub fn parse_prediction(reply: &str) -> Result<ModelPrediction, ClassifyError> {
    let json = match (reply.find('{'), reply.rfind('}')) {
        (Some(start), Some(end)) if end > start => &reply[start..=end],
        _ => {
            return Err(ClassifyError::InvalidResponse(format!(
                "no JSON object in reply: {}",
                reply.trim()
            )));
        }
    };

    let raw: RawPrediction = serde_json::from_str(json)
        .map_err(|e| ClassifyError::InvalidResponse(format!("{}: {}", e, json)))?;

    let label = raw.category.trim();
    let category = label
        .parse::<DocumentCategory>()
        .ok()
        .or_else(|| DocumentCategory::ALL.into_iter().find(|c| c.label_fa() == label))
        .ok_or_else(|| ClassifyError::InvalidResponse(format!("unknown category {}", label)))?;

    let confidence = raw
        .confidence
        .filter(|c| c.is_finite())
        .unwrap_or(0.5)
        .clamp(0.0, 1.0);

    Ok(ModelPrediction {
        category,
        confidence,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::mock_model::MockCompletionModel;

    #[test]
    fn test_parse_plain_json() {
        let prediction = parse_prediction(r#"{"category": "law", "confidence": 0.8}"#).unwrap();
        assert_eq!(prediction.category, DocumentCategory::Law);
        assert_eq!(prediction.confidence, 0.8);
    }

    #[test]
    fn test_parse_fenced_reply() {
        let reply = "Sure:\n```json\n{\"category\": \"judicial-ruling\", \"confidence\": 3}\n```";
        let prediction = parse_prediction(reply).unwrap();
        assert_eq!(prediction.category, DocumentCategory::JudicialRuling);
        assert_eq!(prediction.confidence, 1.0);
    }

    #[test]
    fn test_parse_persian_label_and_missing_confidence() {
        let label = DocumentCategory::Treaty.label_fa();
        let prediction = parse_prediction(&format!(r#"{{"category": "{}"}}"#, label)).unwrap();
        assert_eq!(prediction.category, DocumentCategory::Treaty);
        assert_eq!(prediction.confidence, 0.5);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            parse_prediction("I think it is a law"),
            Err(ClassifyError::InvalidResponse(_))
        ));
        assert!(matches!(
            parse_prediction(r#"{"category": "poem"}"#),
            Err(ClassifyError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_llm_classifier_with_mock_model() {
        let model = MockCompletionModel::new();
        model
            .set_text_response(r#"{"category":"directive","confidence":0.7}"#)
            .await;

        let classifier = LlmClassifier::new(model).with_max_chars(100);
        let prediction = classifier.predict("بخشنامه", "متن").await.unwrap();

        assert_eq!(prediction.category, DocumentCategory::Directive);
        assert_eq!(prediction.confidence, 0.7);
    }
}
