// SPDX-License-Identifier: MIT

//! Buffered, size-rotated per-stream line logger (§4.B).
//!
//! Lines are buffered in memory and flushed either when the buffer grows
//! past a threshold or on an explicit `flush()` call from the owning
//! wrapper's periodic flush fiber. Rotation is atomic: the current file is
//! closed, renamed to a numbered backup, and a fresh file opened in its
//! place — the same buffer-then-atomic-rename shape as the teacher's WAL
//! rotation, specialized to plain newline-delimited text instead of JSONL.

use crate::error::LoggerError;
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

const DEFAULT_MAX_BYTES: u64 = 100 * 1024 * 1024;
const DEFAULT_FLUSH_THRESHOLD: usize = 256;
/// Per-stream write buffer cap; crossing it flushes immediately rather than
/// waiting for the 2s flush fiber or the line-count threshold.
const DEFAULT_FLUSH_BYTES: usize = 4 * 1024;

pub struct RotatingLineLogger {
    path: PathBuf,
    file: File,
    bytes_written: u64,
    max_bytes: u64,
    buffer: Vec<u8>,
    flush_threshold: usize,
    flush_bytes: usize,
    buffered_lines: usize,
}

impl RotatingLineLogger {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, LoggerError> {
        Self::with_max_bytes(path, DEFAULT_MAX_BYTES)
    }

    pub fn with_max_bytes(path: impl Into<PathBuf>, max_bytes: u64) -> Result<Self, LoggerError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let bytes_written = file.metadata()?.len();
        Ok(Self {
            path,
            file,
            bytes_written,
            max_bytes,
            buffer: Vec::new(),
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
            flush_bytes: DEFAULT_FLUSH_BYTES,
            buffered_lines: 0,
        })
    }

    /// Buffer one line (newline appended). Triggers a flush (and, if the
    /// post-flush file size crosses `max_bytes`, a rotation) once either the
    /// line-count threshold or the 4 KiB buffer-size threshold is hit. A
    /// caller running a periodic 2s flush fiber covers the low-throughput
    /// case where neither threshold is reached.
    pub fn write_line(&mut self, line: &str) -> Result<(), LoggerError> {
        self.buffer.extend_from_slice(line.as_bytes());
        self.buffer.push(b'\n');
        self.buffered_lines += 1;
        if self.buffered_lines >= self.flush_threshold || self.buffer.len() >= self.flush_bytes {
            self.flush()?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), LoggerError> {
        if !self.buffer.is_empty() {
            self.file.write_all(&self.buffer)?;
            self.file.flush()?;
            self.bytes_written += self.buffer.len() as u64;
            self.buffer.clear();
            self.buffered_lines = 0;
        }
        if self.bytes_written >= self.max_bytes {
            self.rotate()?;
        }
        Ok(())
    }

    fn rotate(&mut self) -> Result<(), LoggerError> {
        self.file.sync_all()?;
        let rotated = Self::next_backup_path(&self.path)?;
        std::fs::rename(&self.path, &rotated)?;
        self.file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        self.bytes_written = 0;
        Ok(())
    }

    fn next_backup_path(path: &Path) -> Result<PathBuf, LoggerError> {
        let mut n = 1u32;
        loop {
            let candidate = path.with_extension(format!("{n}.log"));
            if !candidate.exists() {
                return Ok(candidate);
            }
            n += 1;
        }
    }

    /// Close out the current file, flushing any buffered lines first.
    pub fn close(&mut self) -> Result<(), LoggerError> {
        self.flush_pending_only()
    }

    fn flush_pending_only(&mut self) -> Result<(), LoggerError> {
        if !self.buffer.is_empty() {
            self.file.write_all(&self.buffer)?;
            self.file.flush()?;
            self.buffer.clear();
            self.buffered_lines = 0;
        }
        self.file.sync_all()?;
        Ok(())
    }

    /// Return the last `n` lines without a second store round-trip.
    pub fn tail(&self, n: usize) -> Result<Vec<String>, LoggerError> {
        let file = File::open(&self.path)?;
        let reader = BufReader::new(file);
        let mut ring: VecDeque<String> = VecDeque::with_capacity(n.min(4096));
        for line in reader.lines() {
            let line = line?;
            if ring.len() == n {
                ring.pop_front();
            }
            ring.push_back(line);
        }
        for pending in String::from_utf8_lossy(&self.buffer).lines() {
            if ring.len() == n {
                ring.pop_front();
            }
            ring.push_back(pending.to_string());
        }
        Ok(ring.into_iter().collect())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
