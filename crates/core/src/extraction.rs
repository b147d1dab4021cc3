// SPDX-License-Identifier: MIT

//! Extraction event and code-block records produced by [`crate::extractor`].

use crate::pattern::{PatternCategory, RiskLevel};
use crate::session::SessionId;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// A structured record produced by matching one pattern against one line.
///
/// Dedup key: `(session_id, pattern_name, line_number, matched_value)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionEvent {
    pub session_id: SessionId,
    pub agent_name: String,
    pub timestamp_ms: u64,
    pub line_number: u64,
    pub event_type: PatternCategory,
    pub pattern_name: String,
    pub matched_value: String,
    pub original_line: String,
    pub metadata: HashMap<String, String>,
    pub risk_level: RiskLevel,
    pub auto_confirmable: bool,
}

impl ExtractionEvent {
    pub fn dedup_key(&self) -> (SessionId, String, u64, String) {
        (
            self.session_id.clone(),
            self.pattern_name.clone(),
            self.line_number,
            self.matched_value.clone(),
        )
    }
}

/// A multi-line extraction bounded by a begin/end pattern pair.
///
/// Dedup key: `(agent_name, digest)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeBlock {
    pub session_id: SessionId,
    pub agent_name: String,
    pub timestamp_ms: u64,
    pub start_line: u64,
    pub end_line: u64,
    pub language: Option<String>,
    pub content: String,
    pub line_count: u64,
    pub digest: String,
    /// Set when the block was emitted because the process exited before a
    /// matching end pattern arrived.
    pub unclosed: bool,
}

impl CodeBlock {
    pub fn dedup_key(&self) -> (String, String) {
        (self.agent_name.clone(), self.digest.clone())
    }

    /// SHA-256 hex digest of the block content, used as the dedup digest.
    pub fn digest_of(content: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}
