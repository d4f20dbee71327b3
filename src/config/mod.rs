//! Environment-driven configuration and the immutable per-session
//! [`AudioConfig`]. Grounded in `pkg/config/config.go` and
//! `internal/audio/config/config.go` of the original implementation.

mod audio;
mod env;

pub use audio::{AudioConfig, CodecKind, ENERGY_THRESHOLD, JITTER_BUFFER_SIZE};
pub use env::{load_dotenv, stun_servers, turn_servers};
