use std::sync::OnceLock;

use log::trace;
use regex::Regex;

use crate::slicer::Index;

fn pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"\{[^{}]*"checksums"[^{}]*\}"#).expect("static index pattern")
    })
}

/// Flat JSON objects in `text` that mention a checksums field.
pub fn candidates(text: &str) -> Vec<&str> {
    pattern().find_iter(text).map(|m| m.as_str()).collect()
}

/// Every candidate that parses as an index, in order of appearance.
pub fn find_indexes(text: &str) -> Vec<Index> {
    candidates(text)
        .into_iter()
        .filter_map(|c| match serde_json::from_str::<Index>(c) {
            Ok(index) => Some(index),
            Err(e) => {
                trace!("Dropping index candidate: {}", e);
                None
            }
        })
        .collect()
}
