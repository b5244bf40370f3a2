//! Listing response parsing with per-item validation.
//!
//! Each raw item is validated independently: unusable items are dropped from
//! the batch, volatile fields fall back to defaults, and nothing here is
//! fatal to the caller.

use serde::Deserialize;
use serde_json::Value;
use std::time::{SystemTime, UNIX_EPOCH};
use subwatch_core::Hit;
use tracing::{debug, warn};

/// Author placeholder when the field is absent or removed upstream.
const FALLBACK_AUTHOR: &str = "[deleted]";

/// Listing envelope returned by the `new.json` endpoints.
#[derive(Debug, Deserialize)]
pub struct Listing {
    #[serde(default)]
    pub kind: String,
    pub data: ListingData,
}

#[derive(Debug, Deserialize)]
pub struct ListingData {
    #[serde(default)]
    pub children: Vec<ListingChild>,
    #[serde(default)]
    pub after: Option<String>,
    #[serde(default)]
    pub dist: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct ListingChild {
    #[serde(default)]
    pub kind: String,
    pub data: Value,
}

/// Per-item validation verdict.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    /// All fields present and well-typed.
    Parsed(Hit),
    /// Usable, with the named fields substituted by fallbacks.
    Defaulted(Hit, Vec<&'static str>),
    /// Unusable; dropped from the batch.
    Rejected(String),
}

/// Extracts every usable item from a raw listing response. An envelope with
/// an unexpected shape yields an empty batch rather than an error.
pub fn parse_listing(json: &Value) -> Vec<Hit> {
    let listing: Listing = match serde_json::from_value(json.clone()) {
        Ok(listing) => listing,
        Err(e) => {
            warn!("unexpected listing shape: {e}");
            return Vec::new();
        }
    };

    let total = listing.data.children.len();
    let mut hits = Vec::with_capacity(total);
    for child in &listing.data.children {
        match parse_post(&child.data) {
            ParseOutcome::Parsed(hit) => hits.push(hit),
            ParseOutcome::Defaulted(hit, fields) => {
                debug!(id = %hit.id, ?fields, "item parsed with fallback fields");
                hits.push(hit);
            }
            ParseOutcome::Rejected(reason) => {
                debug!("dropped malformed item: {reason}");
            }
        }
    }
    if hits.len() != total {
        warn!("dropped {}/{} items from batch", total - hits.len(), total);
    }
    hits
}

/// Validates one raw item. Identity and navigation fields are required;
/// volatile fields fall back per-field.
pub fn parse_post(raw: &Value) -> ParseOutcome {
    let Some(obj) = raw.as_object() else {
        return ParseOutcome::Rejected("item is not an object".to_string());
    };

    let mut defaulted: Vec<&'static str> = Vec::new();

    let Some(id) = non_empty_str(obj.get("id")) else {
        return ParseOutcome::Rejected("missing id".to_string());
    };
    let Some(title) = non_empty_str(obj.get("title")) else {
        return ParseOutcome::Rejected(format!("missing title for {id}"));
    };
    let Some(subreddit) = non_empty_str(obj.get("subreddit")) else {
        return ParseOutcome::Rejected(format!("missing subreddit for {id}"));
    };
    let Some(permalink) = non_empty_str(obj.get("permalink")) else {
        return ParseOutcome::Rejected(format!("missing permalink for {id}"));
    };

    let author = match non_empty_str(obj.get("author")) {
        Some(author) => author,
        None => {
            defaulted.push("author");
            FALLBACK_AUTHOR.to_string()
        }
    };

    let created_utc = match timestamp(obj.get("created_utc")) {
        Some(ts) => ts,
        None => {
            defaulted.push("created_utc");
            now_epoch()
        }
    };

    let score = match obj.get("score").and_then(Value::as_f64) {
        Some(score) => score as i64,
        None => {
            defaulted.push("score");
            0
        }
    };

    let num_comments = match obj.get("num_comments").and_then(Value::as_u64) {
        Some(count) => count,
        None => {
            defaulted.push("num_comments");
            0
        }
    };

    let hit = Hit {
        id,
        title,
        author,
        subreddit,
        permalink,
        url: opt_str(obj.get("url")),
        selftext: opt_str(obj.get("selftext")),
        created_utc,
        score,
        num_comments,
        link_flair_text: opt_str(obj.get("link_flair_text")),
        is_self: obj.get("is_self").and_then(Value::as_bool).unwrap_or(true),
        over_18: obj.get("over_18").and_then(Value::as_bool).unwrap_or(false),
    };

    if defaulted.is_empty() {
        ParseOutcome::Parsed(hit)
    } else {
        ParseOutcome::Defaulted(hit, defaulted)
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value?
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn opt_str(value: Option<&Value>) -> Option<String> {
    value?
        .as_str()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Accepts float or integer seconds, or a numeric string.
fn timestamp(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_f64().map(|f| f as i64),
        Value::String(s) => s.trim().parse::<f64>().ok().map(|f| f as i64),
        _ => None,
    }
}

fn now_epoch() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
