use chrono::{DateTime, Utc};
use tracing::debug;

use crate::memory::types::{Preference, Sentiment};

const MIN_TOPIC_CHARS: usize = 2;
const MAX_TOPIC_CHARS: usize = 50;

// Dislikes first: "i don't like" would otherwise never be reached.
const DISLIKE_MARKERS: [&str; 6] = [
    "i don't like ",
    "i dont like ",
    "i do not like ",
    "i hate ",
    "i'm scared of ",
    "i am scared of ",
];

const LIKE_MARKERS: [&str; 4] = ["i really like ", "i like ", "i love ", "i enjoy "];

const LEADING_FILLERS: [&str; 7] = ["a ", "an ", "the ", "some ", "to ", "my ", "playing with "];
const VAGUE_TOPICS: [&str; 7] = ["it", "that", "this", "them", "something", "anything", "everything"];

/// Pull at most one structured preference out of an utterance.
///
/// Only the topic and the sentiment survive; the utterance itself is
/// dropped by the caller.
pub fn extract_preference(text: &str, now: DateTime<Utc>) -> Option<Preference> {
    let lower = text.trim().to_lowercase();
    if lower.chars().count() < 5 {
        return None;
    }

    let found = DISLIKE_MARKERS
        .iter()
        .find_map(|m| after_marker(&lower, m).map(|rest| (Sentiment::Dislike, rest)))
        .or_else(|| favourite(&lower).map(|rest| (Sentiment::Like, rest)))
        .or_else(|| {
            LIKE_MARKERS
                .iter()
                .find_map(|m| after_marker(&lower, m).map(|rest| (Sentiment::Like, rest)))
        });

    let (sentiment, rest) = found?;
    let topic = clean_topic(rest)?;
    debug!("[Preference] Detected {:?} ({} chars)", sentiment, topic.chars().count());

    Some(Preference {
        topic,
        sentiment,
        recorded_at: now,
    })
}

fn after_marker<'a>(lower: &'a str, marker: &str) -> Option<&'a str> {
    let idx = lower.find(marker)?;
    // Marker must start a word.
    if idx > 0 && !lower[..idx].ends_with(|c: char| c.is_whitespace() || c.is_ascii_punctuation()) {
        return None;
    }
    Some(&lower[idx + marker.len()..])
}

/// "my favorite color is blue" -> "blue"
fn favourite(lower: &str) -> Option<&str> {
    let rest = after_marker(lower, "my favorite ").or_else(|| after_marker(lower, "my favourite "))?;
    let idx = rest.find(" is ")?;
    Some(&rest[idx + " is ".len()..])
}

fn clean_topic(raw: &str) -> Option<String> {
    let end = raw.find(['.', '!', '?', ',']).unwrap_or(raw.len());
    let mut topic = raw[..end].trim();

    loop {
        match LEADING_FILLERS.iter().find(|f| topic.starts_with(**f)) {
            Some(filler) => topic = topic[filler.len()..].trim_start(),
            None => break,
        }
    }

    let len = topic.chars().count();
    if !(MIN_TOPIC_CHARS..=MAX_TOPIC_CHARS).contains(&len) || VAGUE_TOPICS.iter().any(|v| *v == topic) {
        return None;
    }
    Some(topic.to_string())
}
