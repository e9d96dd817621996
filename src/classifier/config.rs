//! Configuration for the classifier

use crate::classifier::error::ClassifyError;
use crate::classifier::quality::QualityWeights;

/// Configuration for the classifier
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierConfig {
    /// Sub-score weights for quality scoring
    pub weights: QualityWeights,

    /// Share of the final category score given to the model, 0 to 1
    pub model_weight: f64,

    /// Characters of content sent to the model
    pub max_model_chars: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            weights: QualityWeights::default(),
            model_weight: 0.4,
            max_model_chars: 4000,
        }
    }
}

impl ClassifierConfig {
    /// Create a new builder
    pub fn builder() -> ClassifierConfigBuilder {
        ClassifierConfigBuilder::default()
    }
}

/// Builder for ClassifierConfig
#[derive(Debug, Default)]
pub struct ClassifierConfigBuilder {
    config: ClassifierConfig,
}

impl ClassifierConfigBuilder {
    /// Set the quality sub-score weights
    pub fn weights(mut self, weights: QualityWeights) -> Self {
        self.config.weights = weights;
        self
    }

    /// Set the share given to the model prediction
    pub fn model_weight(mut self, weight: f64) -> Self {
        self.config.model_weight = weight;
        self
    }

    /// Set how much content is sent to the model
    pub fn max_model_chars(mut self, chars: usize) -> Self {
        self.config.max_model_chars = chars;
        self
    }

    /// Build the configuration, rejecting weights outside their range
    pub fn build(self) -> Result<ClassifierConfig, ClassifyError> {
        let config = self.config;
        if !(0.0..=1.0).contains(&config.model_weight) {
            return Err(ClassifyError::Config(format!(
                "model_weight must be between 0 and 1, got {}",
                config.model_weight
            )));
        }
        let w = &config.weights;
        if [w.legal_density, w.structure, w.reliability, w.readability]
            .iter()
            .any(|x| !x.is_finite() || *x < 0.0)
        {
            return Err(ClassifyError::Config(
                "quality weights must be finite and non-negative".to_string(),
            ));
        }
        Ok(config)
    }
}
