//! Inline action tags in generated text.
//!
//! A reply like `"Too easy [DAB]"` is split into the text to speak and at
//! most one [`GestureTag`].  Only the closed tag set is recognised; every
//! other bracketed upper-case marker is stripped and ignored, so raw model
//! output never reaches gesture dispatch.

use std::sync::LazyLock;

use regex::Regex;
use rival_types::GestureTag;

static MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[A-Z_]+\]").expect("static regex"));
static SPACES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("static regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedReply {
    pub speech: String,
    pub tag: Option<GestureTag>,
}

/// Split `raw` into speech and tag.  When several known tags appear the
/// first in [`GestureTag::ALL`] order wins.
pub fn parse_reply(raw: &str) -> ParsedReply {
    let tag = GestureTag::ALL
        .into_iter()
        .find(|t| raw.contains(t.marker()));
    let stripped = MARKER.replace_all(raw, " ");
    let speech = SPACES.replace_all(stripped.trim(), " ").into_owned();
    ParsedReply { speech, tag }
}
