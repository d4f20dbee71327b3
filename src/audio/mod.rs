//! Audio capture, codec, and playback stack (spec.md §4.1-§4.3).

pub mod capture;
pub mod codec;
pub mod convert;
pub mod pipeline;
pub mod playback;

pub use capture::Capture;
pub use codec::{Decoder, Encoder};
pub use playback::Playback;

/// `cpal::Stream` is `!Send`/`!Sync` on some backends as a blanket
/// cross-platform precaution, even though the underlying handle is
/// just closed/paused/dropped from other threads in practice. `Capture`
/// and `Playback` are always shared behind an `Arc` and never touch the
/// stream's inner state directly (only `Stream::play`/`Stream::pause`,
/// both `&self`), so the unsafe impl is sound here the same way the
/// pack's `SendStream` wrapper relies on it.
struct SendStream(cpal::Stream);
unsafe impl Send for SendStream {}
unsafe impl Sync for SendStream {}

impl std::ops::Deref for SendStream {
    type Target = cpal::Stream;
    fn deref(&self) -> &cpal::Stream {
        &self.0
    }
}
