use std::sync::OnceLock;

use log::trace;
use regex::Regex;

use ncore::hash::Checksum;

use crate::slicer::Chunk;

fn pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\.([0-9A-Za-z_-]{8})\.\.([0-9A-Za-z+/=]+)\.").expect("static block pattern")
    })
}

/// `.<checksum>..<text>.`
pub fn format(chunk: &Chunk) -> String {
    format!(".{}..{}.", chunk.checksum(), chunk.text())
}

/// Find every block in `text` whose checksum verifies.
///
/// Anything else (partial tokens, noise, corrupted blocks) is skipped.
pub fn parse(text: &str) -> Vec<Chunk> {
    let re = pattern();
    let mut chunks = Vec::new();
    let mut at = 0;

    while let Some(caps) = re.captures_at(text, at) {
        let whole = caps.get(0).map_or(at..text.len(), |m| m.range());
        let claimed = &caps[1];
        let body = &caps[2];

        match claimed.parse::<Checksum>() {
            Ok(ck) => match Chunk::verified(ck, body) {
                Some(chunk) => chunks.push(chunk),
                None => trace!("Dropping block {}, checksum mismatch", claimed),
            },
            Err(e) => trace!("Dropping block {}, {}", claimed, e),
        }

        // The closing delimiter may double as the opening of the next block
        at = whole.end - 1;
    }

    chunks
}
