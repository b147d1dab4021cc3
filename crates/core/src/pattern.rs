// SPDX-License-Identifier: MIT

//! Declarative extraction pattern configuration.
//!
//! Patterns are loaded once (typically from a TOML document — see
//! `corral-daemon::config`) into an ordered [`PatternSet`]. A reload swaps
//! the active set atomically: in-flight matches against the old set
//! complete against it, subsequent lines see the new set.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Closed set of extraction categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternCategory {
    Session,
    CodeBlock,
    Metric,
    Error,
    Warning,
    State,
    FileOp,
    Interaction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// One declared pattern: name, compiled regex, category, risk, and the
/// capture-group-to-metadata-field mapping applied on every match.
#[derive(Debug, Clone)]
pub struct Pattern {
    pub name: String,
    pub regex: Arc<Regex>,
    pub category: PatternCategory,
    pub risk_level: RiskLevel,
    pub auto_confirmable: bool,
    /// Capture group name/index (as a string key) -> metadata field name.
    pub capture_map: HashMap<String, String>,
    /// Marks the begin half of a multi-line code-block pair. The extractor's
    /// code-block assembler treats this pattern specially.
    pub code_block_begin: bool,
    pub code_block_end: bool,
    /// Capture group carrying the language tag when `code_block_begin`.
    pub language_capture: Option<String>,
}

/// On-disk declaration for one pattern, as loaded from TOML.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PatternDecl {
    pub name: String,
    pub regex: String,
    pub category: PatternCategory,
    #[serde(default)]
    pub risk_level: Option<RiskLevel>,
    #[serde(default)]
    pub auto_confirmable: bool,
    #[serde(default)]
    pub capture_map: HashMap<String, String>,
    #[serde(default)]
    pub code_block_begin: bool,
    #[serde(default)]
    pub code_block_end: bool,
    #[serde(default)]
    pub language_capture: Option<String>,
}

#[derive(Debug, Error)]
pub enum PatternLoadError {
    #[error("pattern '{name}' failed to compile: {message}")]
    Compile { name: String, message: String },
    #[error("invalid pattern document: {0}")]
    Parse(String),
}

/// An ordered, atomically-swappable set of active patterns.
///
/// Ordering matters: §4.D requires every pattern to be evaluated against
/// each line, with event emission order following declaration order.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    patterns: Arc<Vec<Pattern>>,
}

impl PatternSet {
    pub fn empty() -> Self {
        Self {
            patterns: Arc::new(Vec::new()),
        }
    }

    /// Compile a declarative pattern list. If any pattern fails to compile,
    /// the whole batch is rejected and the caller should retain the
    /// previously-active set (spec's `Pattern-compile-error` policy).
    pub fn compile(decls: &[PatternDecl]) -> Result<Self, PatternLoadError> {
        let mut patterns = Vec::with_capacity(decls.len());
        for decl in decls {
            let regex = Regex::new(&decl.regex).map_err(|e| PatternLoadError::Compile {
                name: decl.name.clone(),
                message: e.to_string(),
            })?;
            patterns.push(Pattern {
                name: decl.name.clone(),
                regex: Arc::new(regex),
                category: decl.category,
                risk_level: decl.risk_level.unwrap_or(RiskLevel::Low),
                auto_confirmable: decl.auto_confirmable,
                capture_map: decl.capture_map.clone(),
                code_block_begin: decl.code_block_begin,
                code_block_end: decl.code_block_end,
                language_capture: decl.language_capture.clone(),
            });
        }
        Ok(Self {
            patterns: Arc::new(patterns),
        })
    }

    pub fn from_toml(doc: &str) -> Result<Self, PatternLoadError> {
        #[derive(Deserialize)]
        struct Document {
            #[serde(default)]
            pattern: Vec<PatternDecl>,
        }
        let document: Document =
            toml::from_str(doc).map_err(|e| PatternLoadError::Parse(e.to_string()))?;
        Self::compile(&document.pattern)
    }

    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
