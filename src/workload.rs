//! A word-count application written against the CFMR callback
//! contracts, usable as-is or as a template for new workloads.

use anyhow::Result;
use bytes::Bytes;
use serde_json::{json, Value};

use crate::emitter::Emitter;

/// Splits the input object on whitespace and commas and emits
/// `(word, "1")` per occurrence. Returns how many pairs were emitted.
pub fn wc_map(_key: &str, data: Bytes, em: &mut Emitter) -> Result<Value> {
    let text = std::str::from_utf8(&data)?;
    let mut emitted = 0usize;
    for word in text.split(|c: char| c.is_whitespace() || c == ',') {
        if word.is_empty() {
            continue;
        }
        em.emit(word.to_string(), "1");
        emitted += 1;
    }
    Ok(json!(emitted))
}

/// Sums the counts for one word and emits `(word, total)`. Returns the
/// total so the runtime sees it in `reducerResult` as well.
pub fn wc_reduce(key: Bytes, values: Vec<Bytes>, em: &mut Emitter) -> Result<Value> {
    let mut total = 0u64;
    for value in values {
        total += std::str::from_utf8(&value)?.parse::<u64>()?;
    }
    em.emit(key, total.to_string());
    Ok(json!(total))
}
