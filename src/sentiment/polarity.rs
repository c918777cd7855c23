//! Polarity scorer.
//!
//! Averages the polarity of every sentiment-bearing token, where a token's
//! polarity is its lexicon valence scaled into `[-1, 1]`. An intensifier
//! multiplies the next token's polarity, and a negation within the two
//! preceding tokens flips and halves it.

use std::sync::Arc;

use super::lexicon::{tokenize, Lexicon};
use super::{SentimentScorer, POLARITY_NEGATIVE, POLARITY_POSITIVE};
use crate::error::PipelineError;
use crate::models::SentimentLabel;

const VALENCE_SCALE: f64 = 4.0;
const INTENSIFY: f64 = 1.3;
const DAMPEN: f64 = 0.7;
const NEGATION_FACTOR: f64 = -0.5;

pub struct PolarityScorer {
    lexicon: Arc<Lexicon>,
}

impl PolarityScorer {
    pub fn new(lexicon: Arc<Lexicon>) -> Self {
        Self { lexicon }
    }
}

impl SentimentScorer for PolarityScorer {
    fn name(&self) -> &'static str {
        "polarity"
    }

    fn raw_score(&self, text: &str) -> Result<f64, PipelineError> {
        let tokens = tokenize(text);
        let mut assessments = Vec::new();

        for (i, token) in tokens.iter().enumerate() {
            if self.lexicon.booster(&token.lower).is_some() {
                continue;
            }
            let Some(valence) = self.lexicon.valence(&token.lower) else {
                continue;
            };
            let mut polarity = (valence / VALENCE_SCALE).clamp(-1.0, 1.0);

            if let Some(prev) = i.checked_sub(1).map(|j| &tokens[j]) {
                match self.lexicon.booster(&prev.lower) {
                    Some(b) if b > 0.0 => polarity *= INTENSIFY,
                    Some(_) => polarity *= DAMPEN,
                    None => {}
                }
            }

            let negated = (1..=2)
                .filter_map(|d| i.checked_sub(d))
                .any(|j| self.lexicon.is_negation(&tokens[j].lower));
            if negated {
                polarity *= NEGATION_FACTOR;
            }

            assessments.push(polarity.clamp(-1.0, 1.0));
        }

        if assessments.is_empty() {
            return Ok(0.0);
        }
        let mean = assessments.iter().sum::<f64>() / assessments.len() as f64;
        if !mean.is_finite() {
            return Err(PipelineError::Scoring("non-finite polarity".to_string()));
        }
        Ok(mean)
    }

    fn label(&self, score: f64) -> SentimentLabel {
        label_for_polarity(score)
    }
}

/// `> 0.1` positive, `< -0.1` negative, otherwise neutral.
pub fn label_for_polarity(score: f64) -> SentimentLabel {
    if score > POLARITY_POSITIVE {
        SentimentLabel::Positive
    } else if score < POLARITY_NEGATIVE {
        SentimentLabel::Negative
    } else {
        SentimentLabel::Neutral
    }
}
