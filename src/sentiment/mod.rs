//! Sentiment classification.
//!
//! Two interchangeable strategies implement [`SentimentScorer`]:
//!
//! | Strategy | Score range | Positive | Negative |
//! |----------|-------------|----------|----------|
//! | [`PolarityScorer`] | `[-1, 1]` polarity | `> 0.1` | `< -0.1` |
//! | [`CompoundScorer`] | `[-1, 1]` compound | `>= 0.05` | `<= -0.05` |
//!
//! The strategy is chosen once from configuration via [`build_scorer`];
//! the resulting scorer is immutable and passed explicitly to every
//! pipeline invocation. Scoring never fails from the caller's point of
//! view: empty text or an internal scoring error yields `0.0` / neutral.

pub mod compound;
pub mod lexicon;
pub mod polarity;

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

pub use compound::CompoundScorer;
pub use lexicon::Lexicon;
pub use polarity::PolarityScorer;

use crate::error::PipelineError;
use crate::metrics::round_to;
use crate::models::{CommentRecord, SentimentLabel, VideoRecord};

pub const POLARITY_POSITIVE: f64 = 0.1;
pub const POLARITY_NEGATIVE: f64 = -0.1;
pub const COMPOUND_POSITIVE: f64 = 0.05;
pub const COMPOUND_NEGATIVE: f64 = -0.05;

/// Score reported to callers, rounded to 3 decimals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SentimentResult {
    pub score: f64,
    pub label: SentimentLabel,
}

impl SentimentResult {
    pub fn neutral() -> Self {
        Self {
            score: 0.0,
            label: SentimentLabel::Neutral,
        }
    }
}

/// Which scoring strategy to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SentimentStrategy {
    Polarity,
    #[default]
    Compound,
}

impl FromStr for SentimentStrategy {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "polarity" | "textblob" => Ok(Self::Polarity),
            "compound" | "vader" => Ok(Self::Compound),
            other => Err(PipelineError::UnknownField(other.to_string())),
        }
    }
}

/// Capability interface for a sentiment back-end.
pub trait SentimentScorer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Unrounded score for non-empty text.
    fn raw_score(&self, text: &str) -> Result<f64, PipelineError>;

    /// Strategy-specific thresholds.
    fn label(&self, score: f64) -> SentimentLabel;

    /// Classify `text`. Never fails: missing or blank text, and any
    /// scoring error, degrade to a neutral zero score.
    fn score(&self, text: Option<&str>) -> SentimentResult {
        let Some(text) = text.filter(|t| !t.trim().is_empty()) else {
            return SentimentResult::neutral();
        };
        match self.raw_score(text) {
            Ok(raw) if raw.is_finite() => SentimentResult {
                score: round_to(raw, 3),
                label: self.label(raw),
            },
            Ok(raw) => {
                let err = PipelineError::Scoring(format!("non-finite score {}", raw));
                tracing::warn!(scorer = self.name(), error = %err, "degrading to neutral");
                SentimentResult::neutral()
            }
            Err(err) => {
                tracing::warn!(scorer = self.name(), error = %err, "degrading to neutral");
                SentimentResult::neutral()
            }
        }
    }
}

/// Construct the configured scorer over a shared lexicon.
pub fn build_scorer(strategy: SentimentStrategy, lexicon: Arc<Lexicon>) -> Box<dyn SentimentScorer> {
    match strategy {
        SentimentStrategy::Polarity => Box::new(PolarityScorer::new(lexicon)),
        SentimentStrategy::Compound => Box::new(CompoundScorer::new(lexicon)),
    }
}

/// Score every caption, overwriting prior sentiment fields.
pub fn classify_videos(videos: &mut [VideoRecord], scorer: &dyn SentimentScorer) {
    for video in videos.iter_mut() {
        let result = scorer.score(Some(&video.caption));
        video.sentiment_score = Some(result.score);
        video.sentiment_label = Some(result.label);
    }
}

/// Score every comment body, overwriting prior sentiment fields.
pub fn classify_comments(comments: &mut [CommentRecord], scorer: &dyn SentimentScorer) {
    for comment in comments.iter_mut() {
        let result = scorer.score(Some(&comment.text));
        comment.sentiment_score = Some(result.score);
        comment.sentiment_label = Some(result.label);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Failing;

    impl SentimentScorer for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }
        fn raw_score(&self, _text: &str) -> Result<f64, PipelineError> {
            Err(PipelineError::Scoring("boom".to_string()))
        }
        fn label(&self, _score: f64) -> SentimentLabel {
            SentimentLabel::Positive
        }
    }

    struct Fixed(f64);

    impl SentimentScorer for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }
        fn raw_score(&self, _text: &str) -> Result<f64, PipelineError> {
            Ok(self.0)
        }
        fn label(&self, score: f64) -> SentimentLabel {
            compound::label_for_compound(score)
        }
    }

    fn both() -> Vec<Box<dyn SentimentScorer>> {
        let lexicon = Arc::new(Lexicon::builtin());
        vec![
            build_scorer(SentimentStrategy::Polarity, lexicon.clone()),
            build_scorer(SentimentStrategy::Compound, lexicon),
        ]
    }

    #[test]
    fn test_empty_and_missing_text_are_neutral() {
        for scorer in both() {
            assert_eq!(scorer.score(Some("")), SentimentResult::neutral());
            assert_eq!(scorer.score(Some("   ")), SentimentResult::neutral());
            assert_eq!(scorer.score(None), SentimentResult::neutral());
        }
    }

    #[test]
    fn test_scoring_failure_degrades_to_neutral() {
        assert_eq!(Failing.score(Some("anything")), SentimentResult::neutral());
        assert_eq!(Fixed(f64::NAN).score(Some("x")), SentimentResult::neutral());
    }

    #[test]
    fn test_compound_boundary_via_contract() {
        assert_eq!(Fixed(0.05).score(Some("x")).label, SentimentLabel::Positive);
        assert_eq!(Fixed(0.049).score(Some("x")).label, SentimentLabel::Neutral);
    }

    #[test]
    fn test_reported_score_rounded_to_three_places() {
        let r = Fixed(0.123456).score(Some("x"));
        assert_eq!(r.score, 0.123);
        // Label is decided before rounding.
        assert_eq!(Fixed(0.0496).score(Some("x")).label, SentimentLabel::Neutral);
        assert_eq!(Fixed(0.0496).score(Some("x")).score, 0.05);
    }

    #[test]
    fn test_classify_overwrites_prior_values() {
        let scorer = build_scorer(SentimentStrategy::Compound, Arc::new(Lexicon::builtin()));
        let mut videos = vec![
            VideoRecord {
                id: "a".into(),
                caption: "I hate this".into(),
                sentiment_score: Some(0.9),
                sentiment_label: Some(SentimentLabel::Positive),
                ..Default::default()
            },
            VideoRecord {
                id: "b".into(),
                ..Default::default()
            },
        ];
        classify_videos(&mut videos, scorer.as_ref());
        assert_eq!(videos[0].sentiment_label, Some(SentimentLabel::Negative));
        assert!(videos[0].sentiment_score.unwrap() < 0.0);
        assert_eq!(videos[1].sentiment_label, Some(SentimentLabel::Neutral));
        assert_eq!(videos[1].sentiment_score, Some(0.0));

        let mut comments = vec![CommentRecord {
            id: "c".into(),
            text: "love it 😍".into(),
            ..Default::default()
        }];
        classify_comments(&mut comments, scorer.as_ref());
        assert_eq!(comments[0].sentiment_label, Some(SentimentLabel::Positive));
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("vader".parse::<SentimentStrategy>().unwrap(), SentimentStrategy::Compound);
        assert_eq!("Polarity".parse::<SentimentStrategy>().unwrap(), SentimentStrategy::Polarity);
        assert!("bayes".parse::<SentimentStrategy>().is_err());
    }
}
