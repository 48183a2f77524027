//! Text analysis strategy used by the learner and the engine.
//!
//! [`KeywordAnalyzer`] is a fixed set of keyword heuristics. Everything here
//! is infallible: odd or empty input simply produces nothing.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::memory::{normalize_tags, MemoryEntry};

/// Longest candidate memory text, in characters.
pub const MAX_CANDIDATE_CHARS: usize = 280;

/// Shortest memory word that counts as a trigger.
const MIN_TRIGGER_WORD: usize = 5;

/// A memory the analyzer proposes to persist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryCandidate {
    pub text: String,
    pub tags: Vec<String>,
}

/// Structured hints pulled out of generated text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Suggestions {
    pub scene_suggestions: Vec<String>,
    pub character_actions: Vec<String>,
    pub plot_developments: Vec<String>,
    pub suggested_actions: Vec<String>,
}

/// Pluggable analysis of interaction text.
pub trait Analyzer: Send + Sync {
    /// Memories worth keeping from one prompt/response exchange.
    fn extract_candidates(&self, prompt: &str, response: &str) -> Vec<MemoryCandidate>;

    fn detect_emotion(&self, text: &str) -> Option<String>;

    /// Whether an existing memory is brought up by the interaction text.
    fn triggers(&self, entry: &MemoryEntry, text: &str) -> bool;

    fn extract_suggestions(&self, text: &str) -> Suggestions;
}

struct CandidateRule {
    keywords: &'static [&'static str],
    tags: &'static [&'static str],
    /// Also tag the candidate with the detected emotion
    with_emotion: bool,
}

const CANDIDATE_RULES: &[CandidateRule] = &[
    CandidateRule {
        keywords: &["remember"],
        tags: &["temporal", "lore"],
        with_emotion: false,
    },
    CandidateRule {
        keywords: &["feel", "emotion"],
        tags: &["emotion"],
        with_emotion: true,
    },
    CandidateRule {
        keywords: &["promise", "swear"],
        tags: &["relationship", "plot"],
        with_emotion: false,
    },
];

/// Emotion families in detection order; a family matches when one of its
/// word forms appears as a whole word.
const EMOTIONS: &[(&str, &[&str])] = &[
    (
        "joy",
        &[
            "joy", "joyful", "joyous", "happy", "happier", "happiest", "happiness", "glad",
            "delight", "delighted", "delightful", "cheerful", "elated",
        ],
    ),
    (
        "sadness",
        &[
            "sad", "sadder", "saddest", "sadness", "sorrow", "sorrowful", "grief", "grieve",
            "grieving", "mourn", "mourning", "weep", "weeping", "wept", "cry", "cried", "crying",
        ],
    ),
    (
        "anger",
        &[
            "anger", "angry", "angrier", "angrily", "furious", "fury", "rage", "raging",
            "enraged", "hate", "hated", "hatred",
        ],
    ),
    (
        "fear",
        &[
            "fear", "feared", "fearful", "afraid", "scared", "terrified", "terror", "dread",
            "dreaded",
        ],
    ),
    (
        "surprise",
        &[
            "surprise", "surprised", "surprising", "astonished", "shock", "shocked", "amazed",
            "amazing",
        ],
    ),
    (
        "love",
        &["love", "loved", "loving", "adore", "adored", "cherish", "cherished", "affection"],
    ),
];

const SCENE_WORDS: &[&str] = &["could", "might", "perhaps"];
const PLOT_WORDS: &[&str] = &["suddenly", "reveal", "discover", "secret", "betray"];

struct Patterns {
    sentence_break: Regex,
    list_item: Regex,
    action: Regex,
}

impl Patterns {
    fn get() -> &'static Patterns {
        static PATTERNS: OnceLock<Patterns> = OnceLock::new();
        PATTERNS.get_or_init(|| Patterns {
            sentence_break: Regex::new(r"[.!?]+\s+|\n+").expect("sentence pattern is valid"),
            list_item: Regex::new(r"^(?:[-*•]|\d+[.)])\s+(.+)$").expect("list pattern is valid"),
            action: Regex::new(r"\*([^*\n]+)\*").expect("action pattern is valid"),
        })
    }
}

/// Deterministic keyword heuristics.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordAnalyzer;

impl KeywordAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

impl Analyzer for KeywordAnalyzer {
    fn extract_candidates(&self, prompt: &str, response: &str) -> Vec<MemoryCandidate> {
        let combined = format!("{}\n{}", prompt, response);
        let sentences = split_sentences(&combined);
        let mut candidates: Vec<MemoryCandidate> = Vec::new();

        for rule in CANDIDATE_RULES {
            let Some(sentence) = sentences.iter().find(|s| {
                let lower = s.to_lowercase();
                rule.keywords.iter().any(|k| lower.contains(k))
            }) else {
                continue;
            };

            let mut tags: Vec<String> = rule.tags.iter().map(|t| t.to_string()).collect();
            if rule.with_emotion {
                if let Some(emotion) = self
                    .detect_emotion(sentence)
                    .or_else(|| self.detect_emotion(&combined))
                {
                    tags.push(emotion);
                }
            }

            let text = truncate_chars(sentence, MAX_CANDIDATE_CHARS);
            match candidates.iter_mut().find(|c| c.text == text) {
                Some(existing) => {
                    existing.tags = normalize_tags(existing.tags.drain(..).chain(tags));
                }
                None => candidates.push(MemoryCandidate {
                    text,
                    tags: normalize_tags(tags),
                }),
            }
        }

        candidates
    }

    fn detect_emotion(&self, text: &str) -> Option<String> {
        let words = words(text);
        EMOTIONS
            .iter()
            .find(|(_, forms)| {
                words.iter().any(|w| forms.contains(&w.as_str()))
            })
            .map(|(name, _)| name.to_string())
    }

    fn triggers(&self, entry: &MemoryEntry, text: &str) -> bool {
        let text = text.to_lowercase();

        let tag_hit = entry
            .tags
            .iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .any(|t| text.contains(&t));

        tag_hit
            || words(&entry.text)
                .iter()
                .filter(|w| w.chars().count() >= MIN_TRIGGER_WORD)
                .any(|w| text.contains(w.as_str()))
    }

    fn extract_suggestions(&self, text: &str) -> Suggestions {
        let patterns = Patterns::get();
        let mut suggestions = Suggestions::default();
        let mut prose = String::new();

        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if let Some(caps) = patterns.list_item.captures(line) {
                suggestions
                    .suggested_actions
                    .push(caps[1].trim().to_string());
                continue;
            }
            for caps in patterns.action.captures_iter(line) {
                let action = caps[1].trim();
                if !action.is_empty() {
                    suggestions.character_actions.push(action.to_string());
                }
            }
            prose.push_str(line);
            prose.push('\n');
        }

        for sentence in split_sentences(&prose) {
            let words = words(&sentence);
            let has = |list: &[&str]| {
                words
                    .iter()
                    .any(|w| list.iter().any(|k| w.starts_with(k)))
            };
            if has(SCENE_WORDS) {
                suggestions.scene_suggestions.push(sentence.clone());
            }
            if has(PLOT_WORDS) {
                suggestions.plot_developments.push(sentence);
            }
        }

        suggestions
    }
}

/// Non-empty trimmed sentences.
pub(crate) fn split_sentences(text: &str) -> Vec<String> {
    Patterns::get()
        .sentence_break
        .split(text)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Lowercase alphanumeric words.
fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    text.trim().chars().take(max).collect::<String>().trim_end().to_string()
}
