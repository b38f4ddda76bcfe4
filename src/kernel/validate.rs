use tracing::info;

use super::session::TurnOutcome;
use super::strategy::RecoveryStrategy;

/// A reply after structural limits were enforced.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckedReply {
    pub text: String,
    pub trimmed: bool,
    pub outcome: TurnOutcome,
}

/// Enforce sentence count, clause and length limits on a renderer reply.
///
/// Content is never inspected, only shape. An empty reply, or one that had
/// to be cut down, marks the turn as failed for streak purposes.
pub fn check_reply(reply: &str, strategy: &RecoveryStrategy, max_chars: usize) -> CheckedReply {
    let reply = reply.trim();
    if reply.is_empty() {
        return CheckedReply {
            text: String::new(),
            trimmed: false,
            outcome: TurnOutcome::Failure,
        };
    }

    let mut trimmed = false;
    let limit = strategy.response_length_limit.max(1) as usize;

    // 1. Split compound instructions into their own sentences
    let mut sentences: Vec<String> = Vec::new();
    for sentence in split_sentences(reply) {
        let pieces = split_compound(&sentence);
        if pieces.len() > 1 {
            trimmed = true;
        }
        sentences.extend(pieces);
    }

    // 2. Sentence budget
    if sentences.len() > limit {
        info!("[ReplyCheck] Trimmed from {} to {} sentences", sentences.len(), limit);
        sentences.truncate(limit);
        trimmed = true;
    }

    // 3. At most two commas per sentence
    for sentence in sentences.iter_mut() {
        let parts: Vec<&str> = sentence.split(',').collect();
        if parts.len() > 3 {
            *sentence = format!("{}.", parts[..3].join(",").trim_end());
            trimmed = true;
        }
    }

    let mut text = sentences.join(" ");

    // 4. Character ceiling
    if text.chars().count() > max_chars {
        text = text.chars().take(max_chars).collect::<String>().trim_end().to_string();
        trimmed = true;
    }

    CheckedReply {
        text,
        trimmed,
        outcome: if trimmed { TurnOutcome::Failure } else { TurnOutcome::Success },
    }
}

fn split_sentences(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') && chars.peek().map_or(true, |n| n.is_whitespace()) {
            let s = current.trim();
            if !s.is_empty() {
                out.push(s.to_string());
            }
            current.clear();
        }
    }
    let rest = current.trim();
    if !rest.is_empty() {
        out.push(rest.to_string());
    }
    out
}

/// ", and then" / ", then" chain several steps in one breath.
fn split_compound(sentence: &str) -> Vec<String> {
    let lower = sentence.to_ascii_lowercase();
    for connector in [", and then ", ", then "] {
        if let Some(idx) = lower.find(connector) {
            let head = sentence[..idx].trim_end();
            let tail = sentence[idx + connector.len()..].trim_start();
            let mut out = vec![format!("{}.", head)];
            out.extend(split_compound(&capitalize(tail)));
            return out;
        }
    }
    vec![sentence.to_string()]
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
