//! Include/exclude keyword filtering over item text.
//!
//! Matching is case-insensitive and word-boundary-aware: a boundary is
//! required only on the side where the keyword starts or ends with a word
//! character, so "c++" still matches as a substring while "react" does not
//! match inside "reaction".

use crate::{Config, Hit};
use regex::RegexSet;
use tracing::{debug, warn};

/// Compiled include/exclude patterns for one ruleset.
#[derive(Debug)]
pub struct KeywordSets {
    include: RegexSet,
    exclude: RegexSet,
}

impl KeywordSets {
    pub fn from_config(config: &Config) -> Self {
        Self {
            include: compile(&config.keywords),
            exclude: compile(&config.poison_keywords),
        }
    }

    /// Verdict for one item. Exclusions win; inclusions are mandatory, so an
    /// empty include set matches nothing.
    pub fn matches(&self, hit: &Hit) -> bool {
        let text = search_text(hit);
        if self.exclude.is_match(&text) {
            debug!(id = %hit.id, "hit rejected by poison keyword");
            return false;
        }
        self.include.is_match(&text)
    }
}

/// Whether a single item passes the ruleset's keyword filters.
pub fn matches(hit: &Hit, config: &Config) -> bool {
    KeywordSets::from_config(config).matches(hit)
}

/// Applies the keyword filters per item, preserving input order.
pub fn filter_items(hits: &[Hit], config: &Config) -> Vec<Hit> {
    let sets = KeywordSets::from_config(config);
    let kept: Vec<Hit> = hits.iter().filter(|hit| sets.matches(hit)).cloned().collect();
    if kept.len() != hits.len() {
        debug!("filtered {}/{} hits", hits.len() - kept.len(), hits.len());
    }
    kept
}

fn search_text(hit: &Hit) -> String {
    match &hit.selftext {
        Some(body) => format!("{} {}", hit.title, body),
        None => hit.title.clone(),
    }
}

fn compile(keywords: &[String]) -> RegexSet {
    let patterns: Vec<String> = keywords
        .iter()
        .map(|keyword| keyword.trim())
        .filter(|keyword| !keyword.is_empty())
        .map(keyword_pattern)
        .collect();

    RegexSet::new(&patterns).unwrap_or_else(|e| {
        warn!("failed to compile keyword patterns: {e}");
        RegexSet::empty()
    })
}

fn keyword_pattern(keyword: &str) -> String {
    let starts_word = keyword.chars().next().is_some_and(is_word_char);
    let ends_word = keyword.chars().last().is_some_and(is_word_char);
    format!(
        "(?i){}{}{}",
        if starts_word { r"\b" } else { "" },
        regex::escape(keyword),
        if ends_word { r"\b" } else { "" },
    )
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}
