//! Fixed-pattern readings of a transcript: rematch answers and self
//! introductions.  No language model is involved.

use std::sync::LazyLock;

use regex::Regex;

static AFFIRMATIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(yes|yeah|yep|yup|ya|sure|ok|okay|of course|let'?s go|let'?s play|again|rematch|bring it|why not|absolutely|definitely)\b",
    )
    .expect("static regex")
});

static NEGATIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(no|nope|nah|not now|no thanks|stop|quit|bye|goodbye|i'?m done|enough)\b")
        .expect("static regex")
});

static NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:my name is|i am|i'm)\s+([A-Za-z][A-Za-z0-9_-]{0,20})\b")
        .expect("static regex")
});

/// Words that follow "I am" / "I'm" far more often than a name does.
const NOT_NAMES: &[&str] = &[
    "a", "an", "the", "not", "so", "just", "ready", "good", "fine", "done", "here", "back",
    "sure", "sorry", "ok", "okay", "going", "gonna", "playing", "trying", "thinking", "winning",
    "losing", "tired", "bored", "confused", "happy", "sad", "better", "still", "very", "really",
    "also", "in", "out", "on", "off", "up", "down", "your", "you", "about", "always",
];

/// How a spoken answer to the rematch prompt reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RematchIntent {
    Affirmative,
    Negative,
    /// Neither, or both at once ("yes... no, wait").
    Ambiguous,
}

pub fn classify_rematch(text: &str) -> RematchIntent {
    match (AFFIRMATIVE.is_match(text), NEGATIVE.is_match(text)) {
        (true, false) => RematchIntent::Affirmative,
        (false, true) => RematchIntent::Negative,
        _ => RematchIntent::Ambiguous,
    }
}

/// A name offered in a self introduction, if there is one.
pub fn extract_name(text: &str) -> Option<String> {
    NAME.captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str())
        .find(|candidate| !NOT_NAMES.contains(&candidate.to_ascii_lowercase().as_str()))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rematch_answers() {
        assert_eq!(classify_rematch("Yeah let's go"), RematchIntent::Affirmative);
        assert_eq!(classify_rematch("OK"), RematchIntent::Affirmative);
        assert_eq!(classify_rematch("nah I'm done"), RematchIntent::Negative);
        assert_eq!(classify_rematch("no"), RematchIntent::Negative);
        assert_eq!(classify_rematch("what time is it"), RematchIntent::Ambiguous);
        assert_eq!(classify_rematch("yes no maybe"), RematchIntent::Ambiguous);
    }

    #[test]
    fn words_inside_other_words_do_not_count() {
        // "know" contains "no", "yesterday" contains "yes".
        assert_eq!(classify_rematch("I know yesterday"), RematchIntent::Ambiguous);
    }

    #[test]
    fn learns_names_from_introductions() {
        assert_eq!(extract_name("hi, my name is Sam").as_deref(), Some("Sam"));
        assert_eq!(extract_name("I'm Alex by the way").as_deref(), Some("Alex"));
        assert_eq!(extract_name("I am jo-ann").as_deref(), Some("jo-ann"));
    }

    #[test]
    fn ignores_states_that_look_like_names() {
        assert_eq!(extract_name("I'm ready"), None);
        assert_eq!(extract_name("I am not impressed"), None);
        assert_eq!(extract_name("good move"), None);
    }
}
