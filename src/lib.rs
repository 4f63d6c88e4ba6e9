//! Decoder for flight controller blackbox flight data recorder logs:
//! log discovery, the ASCII header section, and the binary I/P/G/H/S/E
//! frame stream that follows it.

pub mod callbacks;
pub mod error;
pub(crate) mod frame;
pub mod history;
pub mod parser;
pub mod semantic;
pub mod stats;
pub mod stream;

pub use callbacks::BlackboxCallbacks;
pub use error::{Error, Result};
pub use frame::event::{Adjustment, Event};
pub use parser::{
    Decoder, ParseOutcome, FIELDS_MAX, FIELD_INDEX_ITERATION, FIELD_INDEX_TIME, MAX_FRAME_LEN,
    MAX_LOGS,
};
pub use stream::header::Header;
