//! The public decoder: log discovery within a multi-session buffer and the
//! frame-by-frame driver loop that turns one log's bytes into
//! [`BlackboxCallbacks`] calls.
//!
//! Grounded on the reference decoder's `flightLogCreate` (log discovery) and
//! `flightLogParse` (the header/transition/data state machine and its
//! per-frame-type parse/complete dispatch).

use std::ops::ControlFlow;

use crate::callbacks::BlackboxCallbacks;
use crate::error::{Error, Result};
use crate::frame::data::{parse_frame_fields, FieldContext};
use crate::frame::event::{parse_event, Event};
use crate::history::{validate_main_frame, GpsHomeHistory, MainHistory, Rollover};
use crate::stats::LogStatistics;
use crate::stream::header::{parse_headers, Header};
use crate::stream::reader::ByteStream;

/// Upper bound on a single frame's declared field count.
pub const FIELDS_MAX: usize = 128;
/// A frame (marker byte + payload) longer than this is treated as corrupt.
pub const MAX_FRAME_LEN: usize = 256;
/// Upper bound on the number of logs a single file can hold.
pub const MAX_LOGS: usize = 128;
/// Canonical index of the loop-iteration field within a main (I/P) frame.
pub const FIELD_INDEX_ITERATION: usize = 0;
/// Canonical index of the time field within a main (I/P) frame.
pub const FIELD_INDEX_TIME: usize = 1;

const LOG_START_MARKER: &[u8] = b"H Product:Blackbox flight data recorder by Nicholas Sherlock\n";

/// A multi-session blackbox file, split into independently-parseable logs.
///
/// Built once from the whole input buffer; [`Decoder::parse`] can be called
/// any number of times, for any log index, without re-scanning for markers.
pub struct Decoder<'a> {
    data: &'a [u8],
    log_begin: Vec<usize>,
}

impl<'a> Decoder<'a> {
    /// Splits `data` into logs at each occurrence of the start-of-log
    /// marker, capped at [`MAX_LOGS`]. A file with no marker at all is
    /// treated as a single log spanning the whole buffer (the reference
    /// decoder's behaviour for a non-seekable source with no markers).
    pub fn new(data: &'a [u8]) -> Result<Self> {
        if data.is_empty() {
            return Err(Error::EmptyInput);
        }

        let mut log_begin = Vec::new();
        let mut search_from = 0;
        while log_begin.len() < MAX_LOGS && search_from <= data.len() {
            match find_subslice(&data[search_from..], LOG_START_MARKER) {
                Some(offset) => {
                    log_begin.push(search_from + offset);
                    search_from = search_from + offset + LOG_START_MARKER.len();
                }
                None => break,
            }
        }

        if log_begin.is_empty() {
            log_begin.push(0);
        }
        log_begin.push(data.len());

        Ok(Decoder { data, log_begin })
    }

    pub fn log_count(&self) -> usize {
        self.log_begin.len() - 1
    }

    /// Parses one log's frames, invoking `callbacks` for the header,
    /// each frame, and each recognised event, in file order. `raw` forces
    /// every field's predictor to `NONE`, returning the on-wire deltas
    /// rather than reconstructed absolute values.
    ///
    /// Returns a [`ParseOutcome`] recording whether the log reached the end
    /// of its byte range (`completed == false` if a callback asked the
    /// driver loop to stop early) plus the statistics accumulated along the
    /// way; individual corrupt frames are reported through `on_frame_ready`
    /// with `valid == false` rather than failing the whole parse. A fatal
    /// configuration error -- a predictor reaching for a semantic field this
    /// log never declared -- aborts the parse with `Err` instead.
    pub fn parse(
        &self,
        log_index: usize,
        callbacks: &mut impl BlackboxCallbacks,
        raw: bool,
    ) -> Result<ParseOutcome> {
        if log_index >= self.log_count() {
            return Err(Error::LogIndexOutOfRange { index: log_index, count: self.log_count() });
        }

        let start = self.log_begin[log_index];
        let end = self.log_begin[log_index + 1];
        let log_bytes = &self.data[start..end];

        let (remaining, header) = parse_headers(log_bytes).map_err(Error::from)?;
        if header.i_frame.field_count() == 0 {
            return Err(Error::MissingIFrameDefinition);
        }

        let mut stream = ByteStream::new(remaining);
        // Byte offset (within the whole input buffer) of `stream`'s position 0.
        let stream_base = start + (log_bytes.len() - remaining.len());

        let mut state = ParseState::new(&header);
        if callbacks.on_metadata_ready(&header).is_break() {
            state.stats.total_bytes = log_bytes.len() as u64;
            return Ok(ParseOutcome { completed: false, stats: state.stats });
        }

        // Bytes between the end of the header section and the first
        // recognised frame marker are skipped without affecting statistics
        // or stream validity (the reference decoder hasn't entered its data
        // state yet); only garbage seen once real frames are flowing counts
        // as corruption.
        let mut first_frame_seen = false;
        let mut completed = true;

        'driver: loop {
            if stream.at_end() {
                break;
            }
            let marker = stream.peek_char();
            if marker < 0 {
                break;
            }
            let marker = marker as u8;

            if !is_frame_marker(marker) {
                stream.read_byte();
                if first_frame_seen {
                    state.stats.record_unrecognized();
                    state.main.invalidate();
                    state.main_stream_valid = false;
                }
                continue;
            }
            first_frame_seen = true;

            stream.read_byte(); // consume the marker
            let payload_start = stream.pos();
            let frame_offset = stream_base + payload_start - 1;

            state.dispatch_parse(marker, &header, &mut stream, raw)?;

            let payload_size = stream.pos() - payload_start;
            let premature_eof = stream.eof();
            let total_len = payload_size + 1;

            if !premature_eof && total_len <= MAX_FRAME_LEN {
                let (accepted, flow) =
                    state.dispatch_complete(marker, &header, frame_offset, total_len, raw, callbacks);
                if accepted {
                    state.stats.record_valid(marker, total_len);
                } else {
                    state.stats.record_desync(marker);
                }
                if state.log_ended {
                    break 'driver;
                }
                if flow.is_break() {
                    completed = false;
                    break 'driver;
                }
            } else {
                state.main_stream_valid = false;
                state.main.invalidate();
                state.stats.record_corrupt(marker);
                let flow = callbacks.on_frame_ready(false, &[], marker, frame_offset, total_len);
                if premature_eof {
                    stream.clear_eof();
                }
                if flow.is_break() {
                    completed = false;
                    break 'driver;
                }
            }
        }

        state.stats.total_bytes = log_bytes.len() as u64;
        Ok(ParseOutcome { completed, stats: state.stats })
    }
}

/// The result of one [`Decoder::parse`] call: whether the driver loop
/// reached the end of the log's byte range (as opposed to the caller
/// stopping it early via [`ControlFlow::Break`]), plus the statistics
/// accumulated along the way.
pub struct ParseOutcome {
    pub completed: bool,
    pub stats: LogStatistics,
}

fn is_frame_marker(marker: u8) -> bool {
    matches!(marker, b'I' | b'P' | b'G' | b'H' | b'S' | b'E')
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Everything the driver loop carries between frames: the history ring, the
/// last-known GPS/slow rows, the shared rollover accumulator, and running
/// statistics. Lives for the duration of one [`Decoder::parse`] call.
struct ParseState {
    main: MainHistory,
    gps_home: GpsHomeHistory,
    last_gps: Vec<i64>,
    last_gps_valid: bool,
    last_slow: Vec<i64>,
    rollover: Rollover,
    last_main_frame: Option<(i64, i64)>,
    last_skipped_frames: i64,
    main_stream_valid: bool,
    stats: LogStatistics,
    pending_event: Option<Event>,
    /// Set once a `LOG_END` event's literal marker matches, so the driver
    /// loop can stop cleanly instead of scanning past it.
    log_ended: bool,
}

impl ParseState {
    fn new(header: &Header) -> Self {
        ParseState {
            main: MainHistory::new(header.i_frame.field_count()),
            gps_home: GpsHomeHistory::new(header.h_frame.field_count()),
            last_gps: vec![0i64; header.g_frame.field_count()],
            last_gps_valid: false,
            last_slow: vec![0i64; header.s_frame.field_count()],
            rollover: Rollover::new(),
            last_main_frame: None,
            last_skipped_frames: 0,
            main_stream_valid: false,
            stats: LogStatistics::new(header.i_frame.field_count()),
            pending_event: None,
            log_ended: false,
        }
    }

    /// Parses one frame's payload into the appropriate history buffer.
    /// Mirrors `parseIntraframe`/`parseInterframe`/`parseGPSFrame`/
    /// `parseGPSHomeFrame`/`parseSlowFrame`/`parseEventFrame`.
    /// Returns `Err` only for a fatal configuration error (a predictor
    /// reaching for a semantic field this log never declared) -- the driver
    /// loop treats that as grounds to abort the whole parse, per
    /// `applyPrediction`'s `failWithReason` calls in the reference decoder.
    fn dispatch_parse(
        &mut self,
        marker: u8,
        header: &Header,
        stream: &mut ByteStream,
        raw: bool,
    ) -> Result<()> {
        match marker {
            b'I' => {
                let previous = self.main.previous().map(|p| p.to_vec());
                let ctx = FieldContext {
                    min_throttle: header.sys_config.minthrottle as i64,
                    motor_output_low: header.sys_config.motor_output_low as i64,
                    vbat_ref: header.sys_config.vbatref as i64,
                    data_version: header.data_version,
                    motor0_index: header.main_fields.motor.get(0).copied().flatten(),
                    home_coord_0: self.home_coord(header, 0),
                    home_coord_1: self.home_coord(header, 1),
                    last_main_frame_time: self.last_main_frame.map(|(_, t)| t),
                    skipped_frames: 0,
                    previous: previous.as_deref(),
                    previous2: None,
                };
                let current = self.main.current_mut();
                parse_frame_fields(stream, &header.i_frame, current, &ctx, raw)
            }
            b'P' => {
                let skipped = count_intentionally_skipped_frames(
                    self.last_main_frame.map(|(it, _)| it),
                    header.i_interval as i64,
                    *header.p_interval.numer() as i64,
                    *header.p_interval.denom() as i64,
                );
                self.last_skipped_frames = skipped;
                let previous = self.main.previous().map(|p| p.to_vec());
                let previous2 = self.main.previous2().map(|p| p.to_vec());
                let ctx = FieldContext {
                    min_throttle: header.sys_config.minthrottle as i64,
                    motor_output_low: header.sys_config.motor_output_low as i64,
                    vbat_ref: header.sys_config.vbatref as i64,
                    data_version: header.data_version,
                    motor0_index: header.main_fields.motor.get(0).copied().flatten(),
                    home_coord_0: self.home_coord(header, 0),
                    home_coord_1: self.home_coord(header, 1),
                    last_main_frame_time: self.last_main_frame.map(|(_, t)| t),
                    skipped_frames: skipped,
                    previous: previous.as_deref(),
                    previous2: previous2.as_deref(),
                };
                let current = self.main.current_mut();
                parse_frame_fields(stream, &header.p_frame, current, &ctx, raw)
            }
            b'G' => {
                let previous = self.last_gps_valid.then(|| self.last_gps.clone());
                let ctx = FieldContext {
                    min_throttle: header.sys_config.minthrottle as i64,
                    motor_output_low: header.sys_config.motor_output_low as i64,
                    vbat_ref: header.sys_config.vbatref as i64,
                    data_version: header.data_version,
                    motor0_index: None,
                    home_coord_0: self.home_coord(header, 0),
                    home_coord_1: self.home_coord(header, 1),
                    last_main_frame_time: self.last_main_frame.map(|(_, t)| t),
                    skipped_frames: 0,
                    previous: previous.as_deref(),
                    previous2: None,
                };
                let mut current = self.last_gps.clone();
                let result = parse_frame_fields(stream, &header.g_frame, &mut current, &ctx, raw);
                self.last_gps = current;
                result
            }
            b'H' => {
                let ctx = FieldContext {
                    min_throttle: header.sys_config.minthrottle as i64,
                    motor_output_low: header.sys_config.motor_output_low as i64,
                    vbat_ref: header.sys_config.vbatref as i64,
                    data_version: header.data_version,
                    motor0_index: None,
                    home_coord_0: None,
                    home_coord_1: None,
                    last_main_frame_time: None,
                    skipped_frames: 0,
                    previous: None,
                    previous2: None,
                };
                let current = self.gps_home.current_mut();
                parse_frame_fields(stream, &header.h_frame, current, &ctx, raw)
            }
            b'S' => {
                let ctx = FieldContext {
                    min_throttle: header.sys_config.minthrottle as i64,
                    motor_output_low: header.sys_config.motor_output_low as i64,
                    vbat_ref: header.sys_config.vbatref as i64,
                    data_version: header.data_version,
                    motor0_index: None,
                    home_coord_0: None,
                    home_coord_1: None,
                    last_main_frame_time: None,
                    skipped_frames: 0,
                    previous: None,
                    previous2: None,
                };
                let mut current = self.last_slow.clone();
                let result = parse_frame_fields(stream, &header.s_frame, &mut current, &ctx, raw);
                if result.is_ok() {
                    self.last_slow = current;
                }
                result
            }
            b'E' => {
                self.pending_event = parse_event(stream, self.rollover.accumulator());
                Ok(())
            }
            _ => unreachable!("non-frame markers are filtered out before dispatch"),
        }
    }

    fn home_coord(&self, header: &Header, which: usize) -> Option<i64> {
        self.gps_home
            .latched()
            .and_then(|row| header.gps_home_fields.coord[which].map(|ix| row[ix]))
    }

    /// Validates and publishes one completed frame. Mirrors
    /// `completeIntraframe`/`completeInterframe`/`completeGPSFrame`/
    /// `completeGPSHomeFrame`/`completeSlowFrame`/`completeEventFrame`.
    /// Returns whether the frame was accepted (vs. desynced) and whether the
    /// callback asked to stop the driver loop.
    fn dispatch_complete(
        &mut self,
        marker: u8,
        header: &Header,
        frame_offset: usize,
        frame_size: usize,
        raw: bool,
        callbacks: &mut impl BlackboxCallbacks,
    ) -> (bool, ControlFlow<()>) {
        match marker {
            b'I' => {
                let field_count = header.i_frame.field_count();
                {
                    let wire = self.main.current()[FIELD_INDEX_TIME] as u32;
                    let last = self.last_main_frame.map_or(0, |(_, t)| t);
                    let recovered = self.rollover.apply(wire, last);
                    self.main.current_mut()[FIELD_INDEX_TIME] = recovered;
                }

                let has_prior = self.last_main_frame.is_some();
                let valid = if !raw && has_prior {
                    let iteration = self.main.current()[FIELD_INDEX_ITERATION];
                    let time = self.main.current()[FIELD_INDEX_TIME];
                    let (last_it, last_t) = self.last_main_frame.unwrap();
                    validate_main_frame(iteration, time, last_it, last_t)
                } else {
                    true
                };
                self.main_stream_valid = valid;

                if valid {
                    let iteration = self.main.current()[FIELD_INDEX_ITERATION];
                    let time = self.main.current()[FIELD_INDEX_TIME];
                    if let Some((last_it, _)) = self.last_main_frame {
                        self.stats.intentionally_absent_iterations += count_intentionally_skipped_frames_to(
                            Some(last_it),
                            iteration as u32,
                            header.i_interval as i64,
                            *header.p_interval.numer() as i64,
                            *header.p_interval.denom() as i64,
                        ) as u64;
                    }
                    self.last_main_frame = Some((iteration, time));
                    for ix in 0..field_count {
                        self.stats.update_main_field(ix, self.main.current()[ix]);
                    }
                }

                let flow = callbacks.on_frame_ready(
                    valid,
                    &self.main.current()[..field_count],
                    marker,
                    frame_offset,
                    frame_size,
                );

                if valid {
                    self.main.rotate_after_intraframe();
                } else {
                    self.main.invalidate();
                }
                (true, flow)
            }
            b'P' => {
                let field_count = header.i_frame.field_count();
                let valid = if self.main_stream_valid && !raw {
                    let iteration = self.main.current()[FIELD_INDEX_ITERATION];
                    let time = self.main.current()[FIELD_INDEX_TIME];
                    let (last_it, last_t) = self.last_main_frame.unwrap_or((0, 0));
                    validate_main_frame(iteration, time, last_it, last_t)
                } else {
                    self.main_stream_valid
                };
                self.main_stream_valid = valid;

                if valid {
                    let iteration = self.main.current()[FIELD_INDEX_ITERATION];
                    let time = self.main.current()[FIELD_INDEX_TIME];
                    self.last_main_frame = Some((iteration, time));
                    self.stats.intentionally_absent_iterations += self.last_skipped_frames as u64;
                    for ix in 0..field_count {
                        self.stats.update_main_field(ix, self.main.current()[ix]);
                    }
                }

                let flow = callbacks.on_frame_ready(
                    valid,
                    &self.main.current()[..field_count],
                    marker,
                    frame_offset,
                    frame_size,
                );

                if valid {
                    self.main.rotate_after_interframe();
                } else {
                    self.main.invalidate();
                }
                (true, flow)
            }
            b'G' => {
                if let Some(time_ix) = header.gps_fields.time {
                    let wire = self.last_gps[time_ix] as u32;
                    let last = self.last_main_frame.map_or(0, |(_, t)| t);
                    self.last_gps[time_ix] = self.rollover.apply(wire, last);
                }
                let field_count = header.g_frame.field_count();
                let valid = self.gps_home.is_valid();
                self.last_gps_valid = true;
                let flow = callbacks.on_frame_ready(
                    valid,
                    &self.last_gps[..field_count],
                    marker,
                    frame_offset,
                    frame_size,
                );
                (true, flow)
            }
            b'H' => {
                self.gps_home.latch();
                let field_count = header.h_frame.field_count();
                let latched = self.gps_home.latched().unwrap();
                let flow =
                    callbacks.on_frame_ready(true, &latched[..field_count], marker, frame_offset, frame_size);
                (true, flow)
            }
            b'S' => {
                let field_count = header.s_frame.field_count();
                let flow = callbacks.on_frame_ready(
                    true,
                    &self.last_slow[..field_count],
                    marker,
                    frame_offset,
                    frame_size,
                );
                (true, flow)
            }
            b'E' => match self.pending_event.take() {
                Some(event) => {
                    if let Event::LoggingResume { iteration, time } = &event {
                        self.last_main_frame = Some((*iteration as i64, *time));
                    }
                    if let Event::LogEnd = &event {
                        self.log_ended = true;
                    }
                    let flow = callbacks.on_event(&event);
                    (true, flow)
                }
                None => (false, ControlFlow::Continue(())),
            },
            _ => unreachable!("non-frame markers are filtered out before dispatch"),
        }
    }
}

/// `(frameIndex % I) + (Pnum - 1)) % Pdenom < Pnum` -- whether a main frame
/// at this iteration is expected to exist at all, independent of whether it
/// was actually logged.
fn should_have_frame(frame_index: i64, i_interval: i64, p_num: i64, p_denom: i64) -> bool {
    (frame_index % i_interval + p_num - 1) % p_denom < p_num
}

/// Counts forward from `last_iteration + 1` until the next iteration
/// `should_have_frame` predicts a main frame at, which by construction is
/// the iteration the frame now being parsed is expected to carry. `None`
/// (no prior main frame yet) always counts as zero, matching the reference
/// decoder's `(uint32_t) -1` sentinel.
fn count_intentionally_skipped_frames(
    last_iteration: Option<i64>,
    i_interval: i64,
    p_num: i64,
    p_denom: i64,
) -> i64 {
    let last_iteration = match last_iteration {
        None => return 0,
        Some(it) => it,
    };
    let mut count = 0i64;
    let mut frame_index = last_iteration + 1;
    while !should_have_frame(frame_index, i_interval, p_num, p_denom) {
        count += 1;
        frame_index += 1;
    }
    count
}

/// Same idea, but counting only up to a known `target_iteration` rather
/// than until the next expected frame -- used once a frame's iteration has
/// actually been decoded, to tally how many were skipped to get there.
fn count_intentionally_skipped_frames_to(
    last_iteration: Option<i64>,
    target_iteration: u32,
    i_interval: i64,
    p_num: i64,
    p_denom: i64,
) -> i64 {
    let last_iteration = match last_iteration {
        None => return 0,
        Some(it) => it,
    };
    let mut count = 0i64;
    let mut frame_index = last_iteration + 1;
    while (frame_index as u32) < target_iteration {
        if !should_have_frame(frame_index, i_interval, p_num, p_denom) {
            count += 1;
        }
        frame_index += 1;
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::event::Event;

    #[derive(Default)]
    struct Recorder {
        metadata_calls: usize,
        frames: Vec<(bool, Vec<i64>, u8)>,
        events: Vec<Event>,
    }

    impl BlackboxCallbacks for Recorder {
        fn on_metadata_ready(&mut self, _header: &Header) -> ControlFlow<()> {
            self.metadata_calls += 1;
            ControlFlow::Continue(())
        }

        fn on_frame_ready(
            &mut self,
            valid: bool,
            fields: &[i64],
            marker: u8,
            _frame_offset: usize,
            _frame_size: usize,
        ) -> ControlFlow<()> {
            self.frames.push((valid, fields.to_vec(), marker));
            ControlFlow::Continue(())
        }

        fn on_event(&mut self, event: &Event) -> ControlFlow<()> {
            self.events.push(event.clone());
            ControlFlow::Continue(())
        }
    }

    const HEADER_TEXT: &str = concat!(
        "H Product:Blackbox flight data recorder by Nicholas Sherlock\n",
        "H Data version:2\n",
        "H I interval:32\n",
        "H P interval:1/1\n",
        "H Field I name:loopIteration,time\n",
        "H Field I signed:0,0\n",
        "H Field I predictor:0,0\n",
        "H Field I encoding:1,1\n",
    );

    #[test]
    fn should_have_frame_matches_reference_modular_formula() {
        // I interval 4, P interval 1/2: every other non-I iteration carries a frame.
        assert!(should_have_frame(0, 4, 1, 2));
        assert!(!should_have_frame(3, 4, 1, 2));
        assert!(should_have_frame(4, 4, 1, 2));
    }

    #[test]
    fn count_intentionally_skipped_frames_with_no_prior_is_zero() {
        assert_eq!(count_intentionally_skipped_frames(None, 4, 1, 2), 0);
    }

    #[test]
    fn count_intentionally_skipped_frames_counts_forward_to_next_expected() {
        assert_eq!(count_intentionally_skipped_frames(Some(2), 4, 1, 2), 1);
    }

    #[test]
    fn count_intentionally_skipped_frames_to_stops_at_target() {
        assert_eq!(count_intentionally_skipped_frames_to(Some(2), 6, 4, 1, 2), 2);
    }

    #[test]
    fn decoder_new_rejects_empty_input() {
        assert!(Decoder::new(&[]).is_err());
    }

    #[test]
    fn decoder_new_splits_on_repeated_start_marker() {
        let mut data = Vec::new();
        data.extend_from_slice(HEADER_TEXT.as_bytes());
        data.push(b'I');
        data.extend_from_slice(&[0x00, 0x00]);
        data.extend_from_slice(HEADER_TEXT.as_bytes());
        data.push(b'I');
        data.extend_from_slice(&[0x00, 0x00]);

        let decoder = Decoder::new(&data).unwrap();
        assert_eq!(decoder.log_count(), 2);
    }

    #[test]
    fn single_valid_iframe_is_reported() {
        let mut data = Vec::new();
        data.extend_from_slice(HEADER_TEXT.as_bytes());
        data.push(b'I');
        data.extend_from_slice(&[0x00, 0x00]); // iteration=0, time=0

        let decoder = Decoder::new(&data).unwrap();
        let mut rec = Recorder::default();
        decoder.parse(0, &mut rec, false).unwrap();

        assert_eq!(rec.metadata_calls, 1);
        assert_eq!(rec.frames, vec![(true, vec![0, 0], b'I')]);
    }

    #[test]
    fn garbage_before_first_frame_is_silently_skipped() {
        let mut data = Vec::new();
        data.extend_from_slice(HEADER_TEXT.as_bytes());
        data.push(0xFF); // unrecognised byte, no frame parsed yet
        data.push(b'I');
        data.extend_from_slice(&[0x00, 0x00]);

        let decoder = Decoder::new(&data).unwrap();
        let mut rec = Recorder::default();
        decoder.parse(0, &mut rec, false).unwrap();

        assert_eq!(rec.frames, vec![(true, vec![0, 0], b'I')]);
    }

    #[test]
    fn garbage_after_first_frame_is_recorded_as_corrupt_and_desyncs_stream() {
        let mut data = Vec::new();
        data.extend_from_slice(HEADER_TEXT.as_bytes());
        data.push(b'I');
        data.extend_from_slice(&[0x00, 0x00]); // iteration=0, time=0
        data.push(0xFE); // unrecognised byte once data is flowing
        data.push(b'I');
        data.extend_from_slice(&[0x01, 0x02]); // iteration=1, time=2

        let decoder = Decoder::new(&data).unwrap();
        let mut rec = Recorder::default();
        decoder.parse(0, &mut rec, false).unwrap();

        assert_eq!(
            rec.frames,
            vec![(true, vec![0, 0], b'I'), (true, vec![1, 2], b'I')]
        );
    }

    #[test]
    fn log_end_event_is_reported() {
        let mut data = Vec::new();
        data.extend_from_slice(HEADER_TEXT.as_bytes());
        data.push(b'I');
        data.extend_from_slice(&[0x00, 0x00]);
        data.push(b'E');
        data.push(255);
        data.extend_from_slice(b"End of log\0");

        let decoder = Decoder::new(&data).unwrap();
        let mut rec = Recorder::default();
        decoder.parse(0, &mut rec, false).unwrap();

        assert_eq!(rec.frames.len(), 1);
        assert!(matches!(rec.events.as_slice(), [Event::LogEnd]));
    }

    #[test]
    fn log_end_stops_the_driver_loop_before_trailing_garbage() {
        let mut data = Vec::new();
        data.extend_from_slice(HEADER_TEXT.as_bytes());
        data.push(b'I');
        data.extend_from_slice(&[0x00, 0x00]);
        data.push(b'E');
        data.push(255);
        data.extend_from_slice(b"End of log\0");
        // Trailing bytes after LOG_END (e.g. padding) must never be scanned.
        data.push(b'I');
        data.extend_from_slice(&[0xFF, 0xFF]);

        let decoder = Decoder::new(&data).unwrap();
        let mut rec = Recorder::default();
        let outcome = decoder.parse(0, &mut rec, false).unwrap();

        assert_eq!(rec.frames.len(), 1);
        assert!(matches!(rec.events.as_slice(), [Event::LogEnd]));
        assert!(outcome.completed);
    }

    #[test]
    fn callback_break_stops_the_driver_loop_early() {
        struct StopAfterFirst {
            seen: usize,
        }
        impl BlackboxCallbacks for StopAfterFirst {
            fn on_metadata_ready(&mut self, _header: &Header) -> ControlFlow<()> {
                ControlFlow::Continue(())
            }
            fn on_frame_ready(
                &mut self,
                _valid: bool,
                _fields: &[i64],
                _marker: u8,
                _frame_offset: usize,
                _frame_size: usize,
            ) -> ControlFlow<()> {
                self.seen += 1;
                ControlFlow::Break(())
            }
            fn on_event(&mut self, _event: &Event) -> ControlFlow<()> {
                ControlFlow::Continue(())
            }
        }

        let mut data = Vec::new();
        data.extend_from_slice(HEADER_TEXT.as_bytes());
        data.push(b'I');
        data.extend_from_slice(&[0x00, 0x00]);
        data.push(b'I');
        data.extend_from_slice(&[0x01, 0x02]);

        let decoder = Decoder::new(&data).unwrap();
        let mut rec = StopAfterFirst { seen: 0 };
        decoder.parse(0, &mut rec, false).unwrap();

        assert_eq!(rec.seen, 1);
    }

    #[test]
    fn second_iframe_with_backward_iteration_is_rejected() {
        let mut data = Vec::new();
        data.extend_from_slice(HEADER_TEXT.as_bytes());
        data.push(b'I');
        data.extend_from_slice(&[0x05, 0x05]); // iteration=5, time=5
        data.push(b'I');
        data.extend_from_slice(&[0x01, 0x06]); // iteration=1 (backward), time=6

        let decoder = Decoder::new(&data).unwrap();
        let mut rec = Recorder::default();
        decoder.parse(0, &mut rec, false).unwrap();

        assert_eq!(rec.frames[0], (true, vec![5, 5], b'I'));
        assert_eq!(rec.frames[1].0, false);
    }

    #[test]
    fn parse_outcome_reports_valid_frame_count_in_stats() {
        let mut data = Vec::new();
        data.extend_from_slice(HEADER_TEXT.as_bytes());
        data.push(b'I');
        data.extend_from_slice(&[0x00, 0x00]);
        data.push(b'I');
        data.extend_from_slice(&[0x01, 0x02]);

        let decoder = Decoder::new(&data).unwrap();
        let mut rec = Recorder::default();
        let outcome = decoder.parse(0, &mut rec, false).unwrap();

        assert!(outcome.completed);
        assert_eq!(outcome.stats.frame[&b'I'].valid_count, 2);
        assert_eq!(outcome.stats.total_bytes, data.len() as u64);
    }

    #[test]
    fn parse_outcome_marks_incomplete_when_callback_breaks_early() {
        struct StopAfterFirst;
        impl BlackboxCallbacks for StopAfterFirst {
            fn on_metadata_ready(&mut self, _header: &Header) -> ControlFlow<()> {
                ControlFlow::Continue(())
            }
            fn on_frame_ready(
                &mut self,
                _valid: bool,
                _fields: &[i64],
                _marker: u8,
                _frame_offset: usize,
                _frame_size: usize,
            ) -> ControlFlow<()> {
                ControlFlow::Break(())
            }
            fn on_event(&mut self, _event: &Event) -> ControlFlow<()> {
                ControlFlow::Continue(())
            }
        }

        let mut data = Vec::new();
        data.extend_from_slice(HEADER_TEXT.as_bytes());
        data.push(b'I');
        data.extend_from_slice(&[0x00, 0x00]);

        let decoder = Decoder::new(&data).unwrap();
        let mut rec = StopAfterFirst;
        let outcome = decoder.parse(0, &mut rec, false).unwrap();

        assert!(!outcome.completed);
    }

    #[test]
    fn missing_motor0_semantic_field_aborts_parse_with_fatal_error() {
        let header_text = concat!(
            "H Product:Blackbox flight data recorder by Nicholas Sherlock\n",
            "H Data version:2\n",
            "H I interval:32\n",
            "H P interval:1/1\n",
            "H Field I name:loopIteration,time,throttle\n",
            "H Field I signed:0,0,0\n",
            "H Field I predictor:0,0,5\n", // 5 = Motor0, but no motor[0] field declared
            "H Field I encoding:1,1,1\n",
        );
        let mut data = Vec::new();
        data.extend_from_slice(header_text.as_bytes());
        data.push(b'I');
        data.extend_from_slice(&[0x00, 0x00, 0x00]);

        let decoder = Decoder::new(&data).unwrap();
        let mut rec = Recorder::default();
        let result = decoder.parse(0, &mut rec, false);

        assert!(matches!(
            result,
            Err(Error::MissingSemanticField { needed: "motor[0]", .. })
        ));
    }
}
