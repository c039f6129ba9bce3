//! Protocol descriptors and classification
//!
//! A [`Protocol`] describes one recognizable application protocol: the
//! byte/regex rules that identify its handshake and the backend address its
//! traffic is forwarded to. Descriptors are immutable once built and shared
//! read-only between server tasks; [`identify`] classifies a captured
//! buffer against an ordered chain of them.

mod builtin;
mod matcher;

pub use matcher::identify;

use bytes::Bytes;
use regex::bytes::Regex;

/// One recognizable protocol: matching rules plus forward target.
///
/// A descriptor matches a buffer when any of its contains-patterns,
/// prefix-patterns or regexes hits, subject to the optional length gate.
/// A descriptor with no rules at all never matches anything.
#[derive(Debug, Clone)]
pub struct Protocol {
    /// Display name, used only for observability
    name: String,
    /// Backend address (host:port) traffic is forwarded to
    target: String,
    /// Match if the buffer contains any of these byte sequences
    match_contains: Vec<Bytes>,
    /// Match if the buffer starts with any of these byte sequences
    match_prefix: Vec<Bytes>,
    /// Match if any of these patterns matches anywhere in the buffer
    match_regex: Vec<Regex>,
    /// Skip this descriptor for buffers shorter than this (0 = no bound)
    min_len: usize,
    /// Skip this descriptor for buffers longer than this (0 = no bound)
    max_len: usize,
}

impl Protocol {
    /// Create an empty descriptor; add rules with the `with_*` builders.
    pub fn new(name: impl Into<String>, target: impl Into<String>) -> Self {
        Protocol {
            name: name.into(),
            target: target.into(),
            match_contains: Vec::new(),
            match_prefix: Vec::new(),
            match_regex: Vec::new(),
            min_len: 0,
            max_len: 0,
        }
    }

    /// Add a contains-rule: the buffer matches if it contains `pattern`
    /// as a contiguous subsequence.
    pub fn with_contains(mut self, pattern: impl Into<Bytes>) -> Self {
        self.match_contains.push(pattern.into());
        self
    }

    /// Add a prefix-rule: the buffer matches if it starts with `pattern`.
    pub fn with_prefix(mut self, pattern: impl Into<Bytes>) -> Self {
        self.match_prefix.push(pattern.into());
        self
    }

    /// Add a regex-rule: the buffer matches if `regex` matches anywhere.
    pub fn with_regex(mut self, regex: Regex) -> Self {
        self.match_regex.push(regex);
        self
    }

    /// Gate all rules on the buffer length: buffers outside
    /// `[min, max]` skip this descriptor entirely. 0 means "no bound".
    pub fn with_length_bounds(mut self, min: usize, max: usize) -> Self {
        self.min_len = min;
        self.max_len = max;
        self
    }

    /// Display name of the protocol.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Backend address traffic is forwarded to.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Whether any matching rule is configured at all.
    pub fn has_rules(&self) -> bool {
        !self.match_contains.is_empty()
            || !self.match_prefix.is_empty()
            || !self.match_regex.is_empty()
    }
}
