//! Run a command in a pseudoterminal and talk to it as a byte stream.
//!
//! [`pty::PtyBridge`] is the core: it owns one PTY session, polls it for
//! output and forwards input to it. [`server`] wires bridges to TCP
//! connections.

pub mod cli;
pub mod config;
pub mod pty;
pub mod server;
