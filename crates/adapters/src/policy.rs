// SPDX-License-Identifier: MIT

//! Pre-spawn environment policy validation.
//!
//! Generalizes `TmuxAdapter::spawn`'s single working-directory-exists
//! precondition into a small, declarative policy the caller configures per
//! environment. This is validation only — it rejects a spawn request before
//! any process exists. It is not a feedback loop against a running agent.

use crate::error::PolicyError;
use std::path::{Path, PathBuf};

/// A named environment's spawn constraints.
#[derive(Debug, Clone, Default)]
pub struct PolicyCheck {
    pub denied_commands: Vec<String>,
    pub restricted_prefixes: Vec<PathBuf>,
}

impl PolicyCheck {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deny_command(mut self, command: impl Into<String>) -> Self {
        self.denied_commands.push(command.into());
        self
    }

    pub fn restrict_prefix(mut self, prefix: impl Into<PathBuf>) -> Self {
        self.restricted_prefixes.push(prefix.into());
        self
    }

    /// Validate a prospective spawn. Does not touch the filesystem beyond
    /// `Path::exists`/metadata checks; never executes the command.
    pub fn check(&self, command: &str, working_dir: &Path) -> Result<(), PolicyError> {
        if !working_dir.exists() {
            return Err(PolicyError::WorkingDirMissing(working_dir.to_path_buf()));
        }
        let metadata = working_dir
            .metadata()
            .map_err(|_| PolicyError::WorkingDirNotWritable(working_dir.to_path_buf()))?;
        if metadata.permissions().readonly() {
            return Err(PolicyError::WorkingDirNotWritable(working_dir.to_path_buf()));
        }
        if self.denied_commands.iter().any(|d| d == command) {
            return Err(PolicyError::CommandDenied(command.to_string()));
        }
        for prefix in &self.restricted_prefixes {
            if !working_dir.starts_with(prefix) {
                return Err(PolicyError::RestrictedPath(
                    working_dir.to_path_buf(),
                    prefix.clone(),
                ));
            }
        }
        Ok(())
    }
}
