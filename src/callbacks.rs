//! The public callback surface [`Decoder::parse`](crate::parser::Decoder::parse)
//! drives synchronously, one call per header/frame/event, in file order.
//!
//! Grounded on the reference decoder's `flightLogParse` callback triplet
//! (`onMetadataReady`, `onFrameReady`, `onEvent`).

use std::ops::ControlFlow;

use crate::frame::event::Event;
use crate::stream::header::Header;

/// Implemented by whatever a caller wants to do with a decoded log:
/// render it, re-encode it, collect statistics, and so on.
///
/// Every method returns [`ControlFlow`] so a callback can ask the driver
/// loop in [`Decoder::parse`](crate::parser::Decoder::parse) to stop early
/// (e.g. a viewer that only needs the first N frames) without the parser
/// having to guess at a sentinel return value to watch for.
pub trait BlackboxCallbacks {
    /// Called exactly once, after the header section parses successfully
    /// and before the first [`on_frame_ready`](Self::on_frame_ready) call.
    fn on_metadata_ready(&mut self, header: &Header) -> ControlFlow<()>;

    /// Called once per data frame the driver loop attempts to decode,
    /// including corrupt ones (`valid == false`, `fields == &[]`). `marker`
    /// is the frame's type byte (`'I'`, `'P'`, `'G'`, `'H'`, `'S'`).
    /// `frame_offset` and `frame_size` are byte positions within the whole
    /// input buffer passed to [`Decoder::new`](crate::parser::Decoder::new),
    /// covering the marker byte through the end of the frame's payload.
    fn on_frame_ready(
        &mut self,
        valid: bool,
        fields: &[i64],
        marker: u8,
        frame_offset: usize,
        frame_size: usize,
    ) -> ControlFlow<()>;

    /// Called once per recognised event payload. Unrecognised event ids are
    /// silently dropped before reaching this callback.
    fn on_event(&mut self, event: &Event) -> ControlFlow<()>;
}
