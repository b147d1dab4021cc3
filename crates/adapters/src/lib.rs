// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! corral-adapters: I/O-facing supervision of one agent's child process.
//!
//! Owns everything `corral-core` deliberately doesn't: the pty, the on-disk
//! log file, and the network-facing fan-out. [`process::ProcessWrapper`]
//! wires the pure-logic pieces (`Sanitizer`, `Extractor`) from `corral-core`
//! together with [`logger::RotatingLineLogger`] and [`broadcaster::Broadcaster`].

pub mod broadcaster;
pub mod error;
pub mod logger;
pub mod policy;
pub mod process;
pub mod subscription;

pub use broadcaster::{Broadcaster, BroadcasterStats, BroadcastListener, ListenError};
pub use error::{LoggerError, PolicyError, ProcessError};
pub use logger::RotatingLineLogger;
pub use policy::PolicyCheck;
pub use process::{is_alive, ExtractionSink, ProcessWrapper, SessionRecorder, SpawnRequest};
pub use subscription::{liveness_event, SubscriptionManager};
