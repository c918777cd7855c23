//! Compound lexicon scorer.
//!
//! Sums per-token valences with rule-based adjustments and squashes the
//! sum into `[-1, 1]`. The rules follow the well-known compound lexicon
//! heuristics: boosters and dampeners within three tokens, negation
//! within three tokens, contrastive `but`, shouted words, and trailing
//! exclamation marks.

use std::sync::Arc;

use super::lexicon::{tokenize, Lexicon, Token};
use super::{SentimentScorer, COMPOUND_NEGATIVE, COMPOUND_POSITIVE};
use crate::error::PipelineError;
use crate::models::SentimentLabel;

const CAPS_INCREMENT: f64 = 0.733;
const NEGATION_SCALAR: f64 = -0.74;
const EXCLAMATION_INCREMENT: f64 = 0.292;
const MAX_EXCLAMATIONS: usize = 4;
const NORMALIZATION_ALPHA: f64 = 15.0;
const BOOSTER_DISTANCE_DECAY: [f64; 3] = [1.0, 0.95, 0.9];

pub struct CompoundScorer {
    lexicon: Arc<Lexicon>,
}

impl CompoundScorer {
    pub fn new(lexicon: Arc<Lexicon>) -> Self {
        Self { lexicon }
    }

    fn token_valence(&self, tokens: &[Token<'_>], i: usize, caps_differential: bool) -> f64 {
        let token = &tokens[i];
        if self.lexicon.booster(&token.lower).is_some() {
            return 0.0;
        }
        let Some(mut valence) = self.lexicon.valence(&token.lower) else {
            return 0.0;
        };

        if caps_differential && token.is_all_caps() {
            valence += CAPS_INCREMENT * valence.signum();
        }

        for (distance, decay) in BOOSTER_DISTANCE_DECAY.iter().enumerate() {
            let Some(j) = i.checked_sub(distance + 1) else {
                break;
            };
            let prev = &tokens[j];
            if let Some(mut scalar) = self.lexicon.booster(&prev.lower) {
                if valence < 0.0 {
                    scalar = -scalar;
                }
                if caps_differential && prev.is_all_caps() {
                    scalar += CAPS_INCREMENT * valence.signum();
                }
                valence += scalar * decay;
            }
        }

        let negated = (1..=3)
            .filter_map(|d| i.checked_sub(d))
            .any(|j| self.lexicon.is_negation(&tokens[j].lower));
        if negated {
            valence *= NEGATION_SCALAR;
        }

        valence
    }
}

impl SentimentScorer for CompoundScorer {
    fn name(&self) -> &'static str {
        "compound"
    }

    fn raw_score(&self, text: &str) -> Result<f64, PipelineError> {
        let tokens = tokenize(text);
        if tokens.is_empty() {
            return Ok(0.0);
        }

        let caps = tokens.iter().filter(|t| t.is_all_caps()).count();
        let caps_differential = caps > 0 && caps < tokens.len();

        let mut valences: Vec<f64> = (0..tokens.len())
            .map(|i| self.token_valence(&tokens, i, caps_differential))
            .collect();

        if let Some(pivot) = tokens.iter().position(|t| t.lower == "but") {
            for (i, v) in valences.iter_mut().enumerate() {
                if i < pivot {
                    *v *= 0.5;
                } else if i > pivot {
                    *v *= 1.5;
                }
            }
        }

        let mut sum: f64 = valences.iter().sum();
        if sum != 0.0 {
            let bangs = text.matches('!').count().min(MAX_EXCLAMATIONS);
            sum += sum.signum() * bangs as f64 * EXCLAMATION_INCREMENT;
        }

        let compound = sum / (sum * sum + NORMALIZATION_ALPHA).sqrt();
        if !compound.is_finite() {
            return Err(PipelineError::Scoring(format!(
                "non-finite compound score for sum {}",
                sum
            )));
        }
        Ok(compound.clamp(-1.0, 1.0))
    }

    fn label(&self, score: f64) -> SentimentLabel {
        label_for_compound(score)
    }
}

/// `>= 0.05` positive, `<= -0.05` negative, otherwise neutral.
pub fn label_for_compound(score: f64) -> SentimentLabel {
    if score >= COMPOUND_POSITIVE {
        SentimentLabel::Positive
    } else if score <= COMPOUND_NEGATIVE {
        SentimentLabel::Negative
    } else {
        SentimentLabel::Neutral
    }
}
