//! WebRTC peer connection lifecycle (spec.md §4.6-§4.7).

pub mod handlers;
pub mod negotiator;
pub mod supervisor;
pub mod track;

pub use supervisor::{connect, ConnectionHandle};
