//! Unix-socket control plane.
//!
//! A newline-delimited JSON protocol over a local socket: one trigger
//! request in, a stream of progress events and exactly one terminal
//! event out. The daemon side lives in [`listener`], the `mdex-cli` side
//! in [`client`].

pub mod client;
pub mod listener;
pub mod protocol;

pub use client::ControlClient;
pub use listener::ControlListener;
pub use protocol::{ControlEvent, TriggerRequest};
