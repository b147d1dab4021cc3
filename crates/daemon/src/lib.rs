// SPDX-License-Identifier: MIT

//! corral-daemon library surface: the wire protocol and configuration types
//! `corral-cli` links against directly, rather than re-parsing the socket
//! framing itself.

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod config;
pub mod listener;
pub mod protocol;
pub mod registry;
pub mod replay;

pub use config::{Config, ConfigError};
pub use protocol::{
    AgentCommand, AgentDetail, AgentSummary, CreateAgentRequest, QueryExtractionsFilter, ReplayFormat,
    Request, Response, DEFAULT_TIMEOUT, MAX_MESSAGE_SIZE, PROTOCOL_VERSION,
};
