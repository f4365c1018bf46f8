//! Group-aware token window trimming.
//!
//! When the history exceeds the input window, whole message groups are
//! dropped from the oldest non-system end. A group is the minimal unit
//! that keeps an assistant-with-tool-calls message together with its
//! answering tool messages; system messages are never trimmed.

use crate::message::{Message, MessageRole};

/// Trim `messages` so the estimate fits `max_input_tokens - headroom`.
///
/// Returns the retained history in original order. System messages are
/// always kept; other messages are dropped group-wise, oldest first. If
/// even the non-droppable remainder exceeds the budget, the newest group
/// plus system messages are kept regardless and the provider reports the
/// overflow.
#[must_use]
pub fn trim_to_window(
    messages: &[Message],
    max_input_tokens: usize,
    headroom: usize,
    estimate: impl Fn(&Message) -> usize,
) -> Vec<Message> {
    let budget = max_input_tokens.saturating_sub(headroom);
    let total: usize = messages.iter().map(&estimate).sum();
    if total <= budget {
        return messages.to_vec();
    }

    let groups = group_ranges(messages);
    let mut remaining = total;
    let mut dropped = vec![false; groups.len()];

    // Drop oldest groups until the estimate fits, but never the last group.
    for (i, range) in groups.iter().enumerate() {
        if remaining <= budget {
            break;
        }
        if i == groups.len().saturating_sub(1) {
            break;
        }
        let cost: usize = messages[range.clone()].iter().map(&estimate).sum();
        dropped[i] = true;
        remaining = remaining.saturating_sub(cost);
    }

    let mut kept = Vec::with_capacity(messages.len());
    for (i, range) in groups.iter().enumerate() {
        for message in &messages[range.clone()] {
            if !dropped[i] || message.role() == MessageRole::System {
                kept.push(message.clone());
            }
        }
    }
    kept
}

/// Partition indices into trim groups.
///
/// An assistant message with tool calls absorbs the run of tool messages
/// that follows it; every other message is its own group.
fn group_ranges(messages: &[Message]) -> Vec<std::ops::Range<usize>> {
    let mut groups = Vec::new();
    let mut i = 0;
    while i < messages.len() {
        let start = i;
        if messages[i].role() == MessageRole::Assistant && !messages[i].tool_calls().is_empty() {
            i += 1;
            while i < messages.len() && messages[i].role() == MessageRole::Tool {
                i += 1;
            }
        } else {
            i += 1;
        }
        groups.push(start..i);
    }
    groups
}
