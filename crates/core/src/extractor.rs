// SPDX-License-Identifier: MIT

//! Stateful, line-oriented pattern matching.
//!
//! One [`Extractor`] is owned per session. Every configured pattern is
//! evaluated against every line in declaration order; matches against a
//! `code_block_begin`/`code_block_end` pair are diverted into a small state
//! machine (`ExtractState`) that accumulates the block body until it closes
//! or the stream ends.

use crate::extraction::{CodeBlock, ExtractionEvent};
use crate::pattern::PatternSet;
use crate::session::SessionId;
use std::collections::HashMap;
use std::collections::HashSet;

/// Which stream a line arrived on. Carried through to the emitted event's
/// metadata; pty-merged streams collapse both readers onto `Combined`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
    Combined,
}

/// One item produced by a single `process` call, in emission order.
#[derive(Debug, Clone)]
pub enum Extracted {
    Event(ExtractionEvent),
    Block(CodeBlock),
}

/// The code-block assembler's state.
#[derive(Debug, Clone, Default)]
pub enum ExtractState {
    #[default]
    Idle,
    InBlock {
        language: Option<String>,
        buffer: Vec<String>,
        start_line: u64,
    },
}

/// Per-session stateful pattern matcher: §4.D.
pub struct Extractor {
    patterns: PatternSet,
    session_id: SessionId,
    agent_name: String,
    state: ExtractState,
    seen_events: HashSet<(String, u64, String)>,
    seen_blocks: HashSet<String>,
    line_count: u64,
    match_counts: Vec<u64>,
}

impl Extractor {
    pub fn new(patterns: PatternSet, session_id: SessionId, agent_name: String) -> Self {
        let match_counts = vec![0; patterns.len()];
        Self {
            patterns,
            session_id,
            agent_name,
            state: ExtractState::Idle,
            seen_events: HashSet::new(),
            seen_blocks: HashSet::new(),
            line_count: 0,
            match_counts,
        }
    }

    /// Atomically swap the active pattern set. A line already mid-`process`
    /// finishes against the set it started with; only later calls see the
    /// new set.
    pub fn reload_patterns(&mut self, patterns: PatternSet) {
        self.match_counts = vec![0; patterns.len()];
        self.patterns = patterns;
    }

    pub fn line_count(&self) -> u64 {
        self.line_count
    }

    pub fn match_count(&self, pattern_index: usize) -> u64 {
        self.match_counts.get(pattern_index).copied().unwrap_or(0)
    }

    pub fn in_code_block(&self) -> bool {
        matches!(self.state, ExtractState::InBlock { .. })
    }

    /// Process one complete line (newline already stripped by the caller).
    pub fn process(
        &mut self,
        line: &str,
        line_number: u64,
        timestamp_ms: u64,
        _stream: Stream,
    ) -> Vec<Extracted> {
        self.line_count = self.line_count.max(line_number);

        if matches!(self.state, ExtractState::InBlock { .. }) {
            if self.code_block_end_matches(line) {
                return self
                    .close_block(line_number, timestamp_ms)
                    .into_iter()
                    .map(Extracted::Block)
                    .collect();
            }
            if let ExtractState::InBlock { buffer, .. } = &mut self.state {
                buffer.push(line.to_string());
            }
            return Vec::new();
        }

        let mut out = Vec::new();
        for pattern in self.patterns.patterns().iter() {
            let Some(captures) = pattern.regex.captures(line) else {
                continue;
            };
            let idx = self
                .patterns
                .patterns()
                .iter()
                .position(|p| p.name == pattern.name)
                .unwrap_or(0);
            self.match_counts[idx] += 1;

            if pattern.code_block_begin {
                let language = pattern
                    .language_capture
                    .as_deref()
                    .and_then(|name| captures.name(name))
                    .map(|m| m.as_str().to_string());
                self.state = ExtractState::InBlock {
                    language,
                    buffer: Vec::new(),
                    start_line: line_number,
                };
                break;
            }

            let matched_value = captures.get(0).map(|m| m.as_str().to_string()).unwrap_or_default();
            let mut metadata = HashMap::new();
            for (group, field) in &pattern.capture_map {
                if let Some(value) = captures.name(group).map(|m| m.as_str().to_string()) {
                    metadata.insert(field.clone(), value);
                }
            }

            let event = ExtractionEvent {
                session_id: self.session_id.clone(),
                agent_name: self.agent_name.clone(),
                timestamp_ms,
                line_number,
                event_type: pattern.category,
                pattern_name: pattern.name.clone(),
                matched_value: matched_value.clone(),
                original_line: line.to_string(),
                metadata,
                risk_level: pattern.risk_level,
                auto_confirmable: pattern.auto_confirmable,
            };
            let key = (pattern.name.clone(), line_number, matched_value);
            if self.seen_events.insert(key) {
                out.push(Extracted::Event(event));
            }
        }
        out
    }

    /// Flush any open code block at end-of-stream, marking it unclosed.
    pub fn flush_eof(&mut self, line_number: u64, timestamp_ms: u64) -> Option<CodeBlock> {
        let ExtractState::InBlock { language, buffer, start_line } =
            std::mem::replace(&mut self.state, ExtractState::Idle)
        else {
            return None;
        };
        self.build_block(language, buffer, start_line, line_number, timestamp_ms, true)
    }

    fn code_block_end_matches(&self, line: &str) -> bool {
        self.patterns
            .patterns()
            .iter()
            .any(|p| p.code_block_end && p.regex.is_match(line))
    }

    fn close_block(&mut self, end_line: u64, timestamp_ms: u64) -> Option<CodeBlock> {
        let ExtractState::InBlock { language, buffer, start_line } =
            std::mem::replace(&mut self.state, ExtractState::Idle)
        else {
            return None;
        };
        self.build_block(language, buffer, start_line, end_line, timestamp_ms, false)
    }

    fn build_block(
        &mut self,
        language: Option<String>,
        buffer: Vec<String>,
        start_line: u64,
        end_line: u64,
        timestamp_ms: u64,
        unclosed: bool,
    ) -> Option<CodeBlock> {
        let content = buffer.join("\n");
        let digest = CodeBlock::digest_of(&content);
        let block = CodeBlock {
            session_id: self.session_id.clone(),
            agent_name: self.agent_name.clone(),
            timestamp_ms,
            start_line,
            end_line,
            language,
            line_count: buffer.len() as u64,
            content,
            digest: digest.clone(),
            unclosed,
        };
        if self.seen_blocks.insert(digest) {
            Some(block)
        } else {
            None
        }
    }
}

#[cfg(test)]
#[path = "extractor_tests.rs"]
mod tests;
