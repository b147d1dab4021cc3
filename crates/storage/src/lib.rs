// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! corral-storage: durable session and extraction records (§4.F).
//!
//! Two independent `rusqlite`-backed stores sharing one schema file:
//! [`session_store::SessionStore`] for session lifecycle and state-change
//! history, [`extraction_store::ExtractionStore`] for extraction events and
//! code blocks plus the aggregate queries built on top of them.

mod error;
mod extraction_store;
mod recorder;
mod schema;
mod session_store;

pub use error::StoreError;
pub use extraction_store::{to_event, ExtractionStore};
pub use session_store::SessionStore;
