//! Sentiment lexicon shared by both scoring strategies.
//!
//! Valences use the conventional lexicon scale of roughly `[-4, 4]`.
//! The built-in table is tuned for short social captions and comments;
//! a full VADER-format lexicon file can be layered on top with
//! [`Lexicon::extend_from_file`].

use anyhow::{Context, Result};
use std::collections::{HashMap, HashSet};
use std::path::Path;

const WORDS: &[(&str, f64)] = &[
    // positive
    ("amazing", 2.8),
    ("awesome", 3.1),
    ("beautiful", 2.9),
    ("best", 3.2),
    ("better", 1.9),
    ("brilliant", 2.8),
    ("cool", 1.3),
    ("cute", 2.0),
    ("delicious", 2.7),
    ("enjoy", 2.2),
    ("enjoyed", 2.3),
    ("excellent", 2.7),
    ("excited", 1.4),
    ("fantastic", 2.6),
    ("fav", 2.0),
    ("favorite", 2.0),
    ("fire", 1.5),
    ("fun", 2.3),
    ("funny", 1.9),
    ("glad", 2.0),
    ("good", 1.9),
    ("gorgeous", 3.0),
    ("great", 3.1),
    ("happy", 2.7),
    ("helpful", 1.8),
    ("hilarious", 1.7),
    ("incredible", 2.5),
    ("inspiring", 2.6),
    ("legend", 2.1),
    ("like", 1.5),
    ("liked", 1.8),
    ("lol", 1.8),
    ("love", 3.2),
    ("loved", 2.9),
    ("lovely", 2.8),
    ("loves", 2.7),
    ("nice", 1.8),
    ("obsessed", 1.2),
    ("perfect", 2.7),
    ("recommend", 1.5),
    ("satisfying", 2.0),
    ("slay", 2.0),
    ("smart", 1.7),
    ("stunning", 2.9),
    ("thank", 1.5),
    ("thanks", 1.9),
    ("top", 0.8),
    ("useful", 1.9),
    ("win", 2.8),
    ("wonderful", 2.7),
    ("wow", 2.8),
    ("yay", 2.4),
    ("yes", 1.7),
    // negative
    ("angry", -2.3),
    ("annoying", -1.7),
    ("awful", -2.0),
    ("bad", -2.5),
    ("boring", -1.3),
    ("broke", -1.8),
    ("broken", -2.1),
    ("cringe", -2.0),
    ("disappointed", -1.9),
    ("disappointing", -2.2),
    ("disgusting", -2.4),
    ("dislike", -1.6),
    ("fail", -2.5),
    ("fake", -2.1),
    ("hate", -2.7),
    ("hated", -3.2),
    ("horrible", -2.5),
    ("hurt", -2.4),
    ("lame", -1.8),
    ("mad", -2.2),
    ("mess", -1.5),
    ("overrated", -1.5),
    ("pathetic", -2.6),
    ("poor", -2.1),
    ("sad", -2.1),
    ("scam", -2.8),
    ("sick", -2.3),
    ("sorry", -0.3),
    ("stupid", -2.4),
    ("terrible", -2.1),
    ("trash", -1.9),
    ("ugly", -2.3),
    ("upset", -1.6),
    ("useless", -1.8),
    ("waste", -1.8),
    ("worse", -2.1),
    ("worst", -3.1),
    ("wrong", -2.1),
];

const EMOJI: &[(&str, f64)] = &[
    ("😂", 1.8),
    ("🤣", 1.8),
    ("😍", 2.9),
    ("🥰", 2.9),
    ("❤", 3.0),
    ("❤️", 3.0),
    ("🔥", 1.5),
    ("👍", 1.9),
    ("👏", 1.9),
    ("😊", 2.2),
    ("🙌", 1.9),
    ("💯", 1.5),
    ("😢", -1.8),
    ("😭", -1.0),
    ("😡", -2.5),
    ("🤮", -2.6),
    ("👎", -1.9),
    ("💔", -2.4),
    ("😒", -1.4),
];

/// Words that scale the next sentiment word. Positive values intensify,
/// negative values dampen.
const BOOSTERS: &[(&str, f64)] = &[
    ("absolutely", 0.293),
    ("completely", 0.293),
    ("extremely", 0.293),
    ("highly", 0.293),
    ("incredibly", 0.293),
    ("really", 0.293),
    ("so", 0.293),
    ("soo", 0.293),
    ("sooo", 0.293),
    ("super", 0.293),
    ("totally", 0.293),
    ("very", 0.293),
    ("barely", -0.293),
    ("hardly", -0.293),
    ("kinda", -0.293),
    ("slightly", -0.293),
    ("somewhat", -0.293),
    ("sorta", -0.293),
];

const NEGATIONS: &[&str] = &[
    "ain't", "aint", "aren't", "arent", "can't", "cannot", "cant", "didn't", "didnt", "doesn't",
    "doesnt", "don't", "dont", "isn't", "isnt", "never", "no", "nobody", "none", "nor", "not",
    "nothing", "nowhere", "wasn't", "wasnt", "weren't", "werent", "won't", "wont", "wouldn't",
    "wouldnt", "shouldn't", "shouldnt", "couldn't", "couldnt",
];

/// Immutable word and emoji valence table. Built once and shared.
#[derive(Debug, Clone)]
pub struct Lexicon {
    words: HashMap<String, f64>,
    boosters: HashMap<String, f64>,
    negations: HashSet<String>,
}

impl Default for Lexicon {
    fn default() -> Self {
        Self::builtin()
    }
}

impl Lexicon {
    pub fn builtin() -> Self {
        let words = WORDS
            .iter()
            .chain(EMOJI.iter())
            .map(|(w, v)| (w.to_string(), *v))
            .collect();
        let boosters = BOOSTERS.iter().map(|(w, v)| (w.to_string(), *v)).collect();
        let negations = NEGATIONS.iter().map(|w| w.to_string()).collect();
        Self {
            words,
            boosters,
            negations,
        }
    }

    /// Add (or override) entries from a VADER-format lexicon file:
    /// one `token<TAB>mean valence[<TAB>...]` entry per line.
    /// Malformed lines are skipped. Returns the number of entries read.
    pub fn extend_from_file(&mut self, path: &Path) -> Result<usize> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read lexicon file: {}", path.display()))?;
        Ok(self.extend_from_str(&content))
    }

    pub fn extend_from_str(&mut self, content: &str) -> usize {
        let mut added = 0;
        for line in content.lines() {
            let mut fields = line.split('\t');
            let (Some(token), Some(valence)) = (fields.next(), fields.next()) else {
                continue;
            };
            let Ok(valence) = valence.trim().parse::<f64>() else {
                continue;
            };
            if token.is_empty() || !valence.is_finite() {
                continue;
            }
            self.words.insert(token.to_lowercase(), valence);
            added += 1;
        }
        added
    }

    pub fn valence(&self, token: &str) -> Option<f64> {
        self.words.get(token).copied()
    }

    pub fn booster(&self, token: &str) -> Option<f64> {
        self.boosters.get(token).copied()
    }

    pub fn is_negation(&self, token: &str) -> bool {
        self.negations.contains(token) || token.ends_with("n't")
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

/// A word or emoji token with surrounding ASCII punctuation removed, plus
/// its lowercased form. Emoji survive the trim.
#[derive(Debug, Clone)]
pub(crate) struct Token<'a> {
    pub raw: &'a str,
    pub lower: String,
}

impl Token<'_> {
    /// True for shouted words like `LOVE` (letters only, all uppercase).
    pub fn is_all_caps(&self) -> bool {
        let mut letters = self.raw.chars().filter(|c| c.is_alphabetic()).peekable();
        letters.peek().is_some() && letters.all(|c| c.is_uppercase()) && self.raw.chars().count() > 1
    }
}

pub(crate) fn tokenize(text: &str) -> Vec<Token<'_>> {
    text.split_whitespace()
        .flat_map(split_emoji)
        .map(|w| w.trim_matches(|c: char| c.is_ascii_punctuation() && c != '\''))
        .filter(|w| !w.is_empty())
        .map(|raw| Token {
            raw,
            lower: raw
                .chars()
                .filter(|c| !is_skin_tone(*c))
                .flat_map(char::to_lowercase)
                .collect(),
        })
        .collect()
}

/// Split a whitespace word so every emoji stands alone: `"love😍🔥"`
/// becomes `["love", "😍", "🔥"]`. Variation selectors, skin tones and
/// zero-width-joined sequences stay attached to their emoji.
fn split_emoji(word: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut chars = word.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if !is_emoji(c) {
            continue;
        }
        if i > start {
            parts.push(&word[start..i]);
        }
        let mut end = i + c.len_utf8();
        while let Some(&(j, next)) = chars.peek() {
            if is_emoji_modifier(next) {
                end = j + next.len_utf8();
                chars.next();
            } else if next == ZWJ {
                chars.next();
                end = match chars.next() {
                    Some((k, joined)) => k + joined.len_utf8(),
                    None => j + next.len_utf8(),
                };
            } else {
                break;
            }
        }
        parts.push(&word[i..end]);
        start = end;
    }
    if start < word.len() {
        parts.push(&word[start..]);
    }
    parts
}

const ZWJ: char = '\u{200D}';

fn is_skin_tone(c: char) -> bool {
    ('\u{1F3FB}'..='\u{1F3FF}').contains(&c)
}

fn is_emoji_modifier(c: char) -> bool {
    matches!(c, '\u{FE0E}' | '\u{FE0F}') || is_skin_tone(c)
}

fn is_emoji(c: char) -> bool {
    !is_skin_tone(c)
        && matches!(c,
            '\u{1F000}'..='\u{1FAFF}'
            | '\u{2600}'..='\u{27BF}'
            | '\u{2B00}'..='\u{2BFF}')
}
