//! First-match-wins protocol classification
//!
//! [`identify`] is a pure function over an ordered descriptor chain: no
//! state, no side effects, safe for unlimited concurrent callers. Chain
//! order is the caller's priority order; within one descriptor the cheap
//! exact comparisons run before regex evaluation. Callers are expected to
//! place contains-matched protocols (ALPN-style identifiers) ahead of
//! prefix-matched ones, since a prefix alone can false-positive against a
//! signature that appears later or as a substring.

use super::Protocol;
use std::sync::Arc;

/// Classify a captured buffer against an ordered descriptor chain.
///
/// Returns the first descriptor with a matching rule, or `None` when the
/// chain is exhausted. Per descriptor, the evaluation order is: length
/// gate, contains-patterns, prefix-patterns, regexes. Patterns longer
/// than the buffer are skipped individually.
pub fn identify(buffer: &[u8], chain: &[Arc<Protocol>]) -> Option<Arc<Protocol>> {
    let len = buffer.len();

    for protocol in chain {
        if (protocol.min_len != 0 && len < protocol.min_len)
            || (protocol.max_len != 0 && len > protocol.max_len)
        {
            continue;
        }

        for pattern in &protocol.match_contains {
            if pattern.len() > len {
                continue;
            }
            if contains(buffer, pattern) {
                return Some(protocol.clone());
            }
        }

        for pattern in &protocol.match_prefix {
            if pattern.len() > len {
                continue;
            }
            if buffer[..pattern.len()] == pattern[..] {
                return Some(protocol.clone());
            }
        }

        for regex in &protocol.match_regex {
            if regex.is_match(buffer) {
                return Some(protocol.clone());
            }
        }
    }

    None
}

/// Whether `haystack` contains `needle` as a contiguous subsequence.
fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|window| window == needle)
}
