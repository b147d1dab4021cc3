// SPDX-License-Identifier: MIT

//! I/O-facing error taxonomy. Pure-logic errors live in `corral-core::CoreError`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("working directory does not exist: {0}")]
    WorkingDirMissing(std::path::PathBuf),
    #[error("working directory is not writable: {0}")]
    WorkingDirNotWritable(std::path::PathBuf),
    #[error("command '{0}' is denylisted")]
    CommandDenied(String),
    #[error("working directory {0} escapes restricted prefix {1}")]
    RestrictedPath(std::path::PathBuf, std::path::PathBuf),
}

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("policy check failed: {0}")]
    Policy(#[from] PolicyError),
    #[error("failed to allocate pty: {0}")]
    PtyAlloc(String),
    #[error("failed to spawn child: {0}")]
    Spawn(String),
    #[error("illegal control operation in state {0}: {1}")]
    IllegalOperation(String, &'static str),
    #[error("signal delivery failed: {0}")]
    Signal(String),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("logger error: {0}")]
    Logger(#[from] LoggerError),
}

#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
