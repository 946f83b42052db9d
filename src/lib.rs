//! Library to run scheduled dumps of heterogeneous databases and alert on
//! failure.
//!
//! A backup run resolves the engine's native dump tool ([`tools`]), routes the
//! connection through an SSH tunnel when one is configured ([`tunnel`]),
//! builds the tool invocation ([`engines`]) and executes it ([`backup`]).
//! Failed runs fan out to dashboard, webhook and email alert channels
//! ([`notify`]), each best-effort.
//!
//! Storage, SSH transport, SMTP transport and credential encryption are
//! consumed through traits; the shipped binary wires file-backed and inert
//! stand-ins ([`config`]), embedding services provide real implementations.

#![forbid(unsafe_code)]

pub mod backup;
pub mod cli;
pub mod config;
pub mod connection;
pub mod engines;
pub mod notify;
pub mod tools;
pub mod tunnel;
pub mod util;
