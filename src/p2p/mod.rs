//! Overlay discovery and signalling (spec.md §4.4-§4.5).

pub mod discovery;
pub mod signaling;

pub use discovery::{run_discovery, DiscoveredStream, PROTOCOL_ID, RENDEZVOUS_TAG};
pub use signaling::{HandshakeGate, SignalMessage, SignalType, SignalingChannel};
