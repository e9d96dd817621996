//! Heuristic quality scoring

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::classifier::terms::{LEGAL_TERMS, STRUCTURE_MARKERS, count_occurrences};
use crate::crawler::persian_ratio;

/// Legal-term density at which the density score saturates
const FULL_DENSITY: f64 = 0.08;

/// Numbered articles at which the article part of the structure score saturates
const FULL_ARTICLES: usize = 10;

/// Sentence lengths, in words, considered easy to read
const READABLE_SENTENCE: (f64, f64) = (10.0, 25.0);

/// Relative weight of each sub-score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityWeights {
    pub legal_density: f64,
    pub structure: f64,
    pub reliability: f64,
    pub readability: f64,
}

impl Default for QualityWeights {
    fn default() -> Self {
        Self {
            legal_density: 0.35,
            structure: 0.25,
            reliability: 0.25,
            readability: 0.15,
        }
    }
}

impl QualityWeights {
    fn sum(&self) -> f64 {
        self.legal_density + self.structure + self.reliability + self.readability
    }
}

/// Letter grade
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

impl Grade {
    pub fn from_total(total: f64) -> Self {
        match total {
            t if t >= 85.0 => Grade::A,
            t if t >= 70.0 => Grade::B,
            t if t >= 55.0 => Grade::C,
            t if t >= 40.0 => Grade::D,
            _ => Grade::F,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl std::str::FromStr for Grade {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" => Ok(Grade::A),
            "B" => Ok(Grade::B),
            "C" => Ok(Grade::C),
            "D" => Ok(Grade::D),
            "F" => Ok(Grade::F),
            other => Err(crate::Error::Config(format!("Unknown grade: {}", other))),
        }
    }
}

/// Sub-scores and total, all on a 0 to 100 scale
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityScore {
    pub legal_density: f64,
    pub structure: f64,
    pub reliability: f64,
    pub readability: f64,
    pub total: f64,
    pub grade: Grade,
}

impl QualityScore {
    pub fn zero() -> Self {
        Self {
            legal_density: 0.0,
            structure: 0.0,
            reliability: 0.0,
            readability: 0.0,
            total: 0.0,
            grade: Grade::F,
        }
    }
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

fn legal_density_score(content: &str, words: usize) -> f64 {
    let hits: usize = LEGAL_TERMS
        .iter()
        .map(|t| count_occurrences(content, t))
        .sum();
    let density = hits as f64 / words as f64;
    (density / FULL_DENSITY).min(1.0) * 100.0
}

/// 60 points for the variety of markers, 40 for the number of articles
fn structure_score(content: &str) -> f64 {
    let present = STRUCTURE_MARKERS
        .iter()
        .filter(|m| count_occurrences(content, m) > 0)
        .count();
    let articles = count_occurrences(content, "ماده").min(FULL_ARTICLES);

    present as f64 / STRUCTURE_MARKERS.len() as f64 * 60.0
        + articles as f64 / FULL_ARTICLES as f64 * 40.0
}

fn readability_score(content: &str) -> f64 {
    let sentences: Vec<usize> = content
        .split(['.', '!', '?', '؟', '؛', '\n'])
        .map(|s| s.split_whitespace().count())
        .filter(|&n| n > 0)
        .collect();
    if sentences.is_empty() {
        return 0.0;
    }

    let avg = sentences.iter().sum::<usize>() as f64 / sentences.len() as f64;
    let (low, high) = READABLE_SENTENCE;
    let score = if avg < low {
        avg / low * 100.0
    } else if avg > high {
        (100.0 - (avg - high) * 4.0).max(0.0)
    } else {
        100.0
    };

    // Text that is mostly not Persian reads poorly for this audience
    if persian_ratio(content) < 0.3 {
        score / 2.0
    } else {
        score
    }
}

/// Score `content` from a source with the given reliability (0 to 1)
pub fn score_quality(content: &str, reliability: f64, weights: &QualityWeights) -> QualityScore {
    let words = content.split_whitespace().count();
    if words == 0 {
        return QualityScore::zero();
    }

    let legal_density = legal_density_score(content, words);
    let structure = structure_score(content);
    let reliability = if reliability.is_finite() {
        reliability.clamp(0.0, 1.0) * 100.0
    } else {
        0.0
    };
    let readability = readability_score(content);

    let weight_sum = weights.sum();
    let total = if weight_sum > 0.0 {
        (weights.legal_density * legal_density
            + weights.structure * structure
            + weights.reliability * reliability
            + weights.readability * readability)
            / weight_sum
    } else {
        0.0
    };
    let total = round1(total.clamp(0.0, 100.0));

    QualityScore {
        legal_density: round1(legal_density),
        structure: round1(structure),
        reliability: round1(reliability),
        readability: round1(readability),
        total,
        grade: Grade::from_total(total),
    }
}
