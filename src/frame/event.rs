//! The event sub-protocol (marker `'E'`): one-off occurrences interleaved
//! with the main/GPS/slow frame stream (arming beeps, in-flight tuning
//! adjustments, logging resume, end of log).

use crate::stream::{codec, reader::ByteStream};

#[derive(Debug, Clone, Copy)]
pub enum Adjustment {
    Float(f32),
    Int(i32),
}

#[derive(Debug, Clone)]
pub enum Event {
    SyncBeep {
        time: i64,
    },
    InFlightAdjustment {
        function: u8,
        adjustment: Adjustment,
    },
    LoggingResume {
        iteration: u32,
        time: i64,
    },
    LogEnd,
}

/// Parses one event payload. The event marker byte itself is assumed
/// already consumed by the caller, matching how every other frame type is
/// dispatched. Returns `None` for an unrecognised or malformed event id,
/// which the caller treats as frame-local and silently drops.
pub(crate) fn parse_event(stream: &mut ByteStream, rollover_accumulator: i64) -> Option<Event> {
    let event_code = stream.read_byte();
    if event_code < 0 {
        return None;
    }

    match event_code as u8 {
        0 => {
            let time = codec::read_unsigned_vb(stream) as i64 + rollover_accumulator;
            Some(Event::SyncBeep { time })
        }
        13 => {
            let function = stream.read_byte();
            if function < 0 {
                return None;
            }
            let function = function as u8;
            if function > 127 {
                let value = stream.read_raw_float()?;
                Some(Event::InFlightAdjustment { function, adjustment: Adjustment::Float(value) })
            } else {
                let value = codec::read_signed_vb(stream);
                Some(Event::InFlightAdjustment { function, adjustment: Adjustment::Int(value) })
            }
        }
        14 => {
            let iteration = codec::read_unsigned_vb(stream);
            let time = codec::read_unsigned_vb(stream) as i64 + rollover_accumulator;
            Some(Event::LoggingResume { iteration, time })
        }
        // FLIGHT_LOG_EVENT_FLIGHTMODE (30) is declared in the reference
        // decoder's event enum but never handled by its parse switch, so it
        // falls through to unrecognised there too; no specimen documents a
        // payload for it.
        255 => {
            const MARKER: &[u8] = b"End of log\0";
            let mut buf = [0u8; 11];
            if stream.read(&mut buf) != MARKER.len() || buf != *MARKER {
                return None;
            }
            Some(Event::LogEnd)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_beep_adds_rollover() {
        let data = [0x05];
        let mut s = ByteStream::new(&data);
        match parse_event(&mut s, 1 << 32) {
            Some(Event::SyncBeep { time }) => assert_eq!(time, 5 + (1i64 << 32)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn log_end_matches_literal_marker() {
        let data = b"End of log\0";
        let mut s = ByteStream::new(data);
        assert!(matches!(parse_event(&mut s, 0), Some(Event::LogEnd)));
    }

    #[test]
    fn log_end_rejects_mismatched_marker() {
        let data = b"not the marker!!";
        let mut s = ByteStream::new(data);
        assert!(parse_event(&mut s, 0).is_none());
    }

    #[test]
    fn unrecognised_event_id_is_none() {
        let data = [99];
        let mut s = ByteStream::new(&data);
        assert!(parse_event(&mut s, 0).is_none());
    }
}
