//! Ranking and keyword extraction.

use regex::Regex;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use crate::aggregate::TimeSeries;
use crate::metrics::{compute_engagement_rate, round_to};
use crate::models::{CommentRecord, VideoRecord};

static HASHTAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"#\w+").unwrap());
static MENTION_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"@\w+").unwrap());
static URL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"http\S+").unwrap());
static PUNCT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\w\s]").unwrap());

static STOP_WORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
        "from", "as", "is", "was", "are", "were", "be", "been", "being", "have", "has", "had",
        "do", "does", "did", "will", "would", "could", "should", "may", "might", "can", "this",
        "that", "these", "those", "i", "you", "he", "she", "it", "we", "they", "my", "your",
        "his", "her", "its", "our", "their",
    ]
    .into_iter()
    .collect()
});

/// The `n` records with the largest `field`, descending. Ties keep corpus
/// order. Records without a value are skipped; an unknown field yields an
/// empty result.
pub fn top_n<'a, R: TimeSeries>(corpus: &'a [R], field: &str, n: usize) -> Vec<&'a R> {
    let Some(probe) = corpus.first() else {
        return Vec::new();
    };
    if probe.metric_field(field).is_none() {
        tracing::debug!(field, "top_n on unknown field");
        return Vec::new();
    }

    let mut scored: Vec<(&R, f64)> = corpus
        .iter()
        .filter_map(|r| r.metric_field(field).flatten().map(|v| (r, v)))
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.into_iter().take(n).map(|(r, _)| r).collect()
}

/// Most frequent words across `texts`, ignoring hashtags, mentions, URLs,
/// punctuation, stop words and tokens of two characters or fewer. Equal
/// counts are ordered by first appearance.
pub fn word_frequency<'a, I>(texts: I, n: usize) -> Vec<(String, usize)>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    let mut order = 0usize;

    for text in texts {
        let text = HASHTAG_RE.replace_all(text, "");
        let text = MENTION_RE.replace_all(&text, "");
        let text = URL_RE.replace_all(&text, "");
        let text = PUNCT_RE.replace_all(&text, "");
        for word in text.to_lowercase().split_whitespace() {
            if word.chars().count() <= 2 || STOP_WORDS.contains(word) {
                continue;
            }
            let entry = counts.entry(word.to_string()).or_insert_with(|| {
                order += 1;
                (0, order)
            });
            entry.0 += 1;
        }
    }

    sorted_counts(counts, n)
}

pub fn caption_word_frequency(videos: &[VideoRecord], n: usize) -> Vec<(String, usize)> {
    word_frequency(videos.iter().map(|v| v.caption.as_str()), n)
}

pub fn comment_word_frequency(comments: &[CommentRecord], n: usize) -> Vec<(String, usize)> {
    word_frequency(comments.iter().map(|c| c.text.as_str()), n)
}

/// Trending hashtags, lowercased and counted once per video.
pub fn hashtag_frequency(videos: &[VideoRecord], n: usize) -> Vec<(String, usize)> {
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    let mut order = 0usize;
    for video in videos {
        let mut seen = HashSet::new();
        for tag in video.hashtags.iter().map(|t| t.to_lowercase()) {
            if !seen.insert(tag.clone()) {
                continue;
            }
            let entry = counts.entry(tag).or_insert_with(|| {
                order += 1;
                (0, order)
            });
            entry.0 += 1;
        }
    }
    sorted_counts(counts, n)
}

fn sorted_counts(counts: HashMap<String, (usize, usize)>, n: usize) -> Vec<(String, usize)> {
    let mut ranked: Vec<(String, usize, usize)> = counts
        .into_iter()
        .map(|(word, (count, first))| (word, count, first))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
    ranked.into_iter().take(n).map(|(w, c, _)| (w, c)).collect()
}

/// One row of the creator leaderboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreatorStats {
    pub author: String,
    pub videos: usize,
    pub total_views: u64,
    pub avg_engagement_rate: f64,
}

/// Per-author totals sorted by total views. Ties keep first-appearance
/// order. Videos without an author are grouped under `""`.
pub fn creator_leaderboard(videos: &[VideoRecord], n: usize) -> Vec<CreatorStats> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut rows: Vec<(CreatorStats, f64)> = Vec::new();

    for video in videos {
        let slot = *index.entry(video.author.as_str()).or_insert_with(|| {
            rows.push((
                CreatorStats {
                    author: video.author.clone(),
                    videos: 0,
                    total_views: 0,
                    avg_engagement_rate: 0.0,
                },
                0.0,
            ));
            rows.len() - 1
        });
        let (stats, rate_sum) = &mut rows[slot];
        stats.videos += 1;
        stats.total_views = stats.total_views.saturating_add(video.views);
        *rate_sum += video
            .engagement_rate
            .unwrap_or_else(|| compute_engagement_rate(video));
    }

    let mut board: Vec<CreatorStats> = rows
        .into_iter()
        .map(|(mut stats, rate_sum)| {
            stats.avg_engagement_rate = round_to(rate_sum / stats.videos as f64, 2);
            stats
        })
        .collect();
    board.sort_by(|a, b| b.total_views.cmp(&a.total_views));
    board.truncate(n);
    board
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video(id: &str, views: u64) -> VideoRecord {
        VideoRecord {
            id: id.into(),
            views,
            ..Default::default()
        }
    }

    #[test]
    fn test_top_n_ties_keep_corpus_order() {
        let corpus = vec![video("a", 10), video("b", 10), video("c", 5)];
        let ids: Vec<&str> = top_n(&corpus, "views", 2).iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_top_n_degrades_gracefully() {
        let corpus = vec![video("a", 10)];
        assert!(top_n(&corpus, "plays", 3).is_empty());
        let empty: Vec<VideoRecord> = Vec::new();
        assert!(top_n(&empty, "views", 3).is_empty());
        assert_eq!(top_n(&corpus, "views", 0).len(), 0);
        assert_eq!(top_n(&corpus, "views", 10).len(), 1);
    }

    #[test]
    fn test_top_n_skips_missing_values() {
        let mut a = video("a", 1);
        a.saves = Some(3);
        let b = video("b", 2);
        let corpus = vec![a, b];
        let ids: Vec<&str> = top_n(&corpus, "saves", 5).iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, vec!["a"]);
    }

    #[test]
    fn test_word_frequency_strips_noise() {
        let freq = word_frequency(
            ["Check #viral @creator http://x.co this is amazing amazing"],
            10,
        );
        assert_eq!(freq[0], ("amazing".to_string(), 2));
        let words: Vec<&str> = freq.iter().map(|(w, _)| w.as_str()).collect();
        assert!(!words.contains(&"viral"));
        assert!(!words.contains(&"creator"));
        assert!(!words.iter().any(|w| w.contains("http") || w.contains("xco")));
        assert!(!words.contains(&"this"));
        assert_eq!(words, vec!["amazing", "check"]);
    }

    #[test]
    fn test_word_frequency_ties_by_first_seen() {
        let freq = word_frequency(["zebra apple", "apple zebra mango"], 3);
        assert_eq!(
            freq,
            vec![
                ("zebra".to_string(), 2),
                ("apple".to_string(), 2),
                ("mango".to_string(), 1)
            ]
        );
    }

    #[test]
    fn test_hashtag_frequency_lowercases() {
        let mut a = video("a", 1);
        a.hashtags = vec!["FYP".into(), "cooking".into()];
        let mut b = video("b", 1);
        b.hashtags = vec!["fyp".into()];
        let freq = hashtag_frequency(&[a, b], 5);
        assert_eq!(freq[0], ("fyp".to_string(), 2));
        assert_eq!(freq[1], ("cooking".to_string(), 1));
    }

    #[test]
    fn test_creator_leaderboard() {
        let mut a = video("a", 100);
        a.author = "chef".into();
        a.likes = 10;
        let mut b = video("b", 300);
        b.author = "dancer".into();
        let mut c = video("c", 300);
        c.author = "chef".into();
        c.likes = 30;
        let board = creator_leaderboard(&[a, b, c], 10);
        assert_eq!(board[0].author, "chef");
        assert_eq!(board[0].videos, 2);
        assert_eq!(board[0].total_views, 400);
        assert_eq!(board[0].avg_engagement_rate, 10.0);
        assert_eq!(board[1].author, "dancer");
        assert_eq!(creator_leaderboard(&[], 5), Vec::new());
    }
}
