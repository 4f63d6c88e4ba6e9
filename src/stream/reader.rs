//! Bit/byte cursor over a borrowed data-frame window.
//!
//! Mirrors the contract of the original tool's `stream.c`: a byte position
//! plus a bit position counting down from 7, so that `read_bits` is
//! MSB-first within each byte and byte-level reads implicitly re-align.

pub const EOF: i32 = -1;

/// A seam for callers that refill a bounded buffer as bytes are consumed
/// (e.g. reading from a serial character device). The core decoder never
/// calls this itself -- it only exposes how many bytes a frame consumed so
/// an external collaborator can decide whether to slide its window.
pub trait StreamRefill {
    fn on_consume(&mut self, bytes_consumed: usize);
}

/// Stateful reader over a `&[u8]` window. All data-frame and codec decoding
/// goes through this rather than through `nom`, since Elias-gamma/delta and
/// the composite tag codecs need a persistent sub-byte bit position that a
/// pure `&[u8] -> IResult` combinator can't carry across calls.
pub struct ByteStream<'a> {
    data: &'a [u8],
    pos: usize,
    bit_pos: u8,
    eof: bool,
}

impl<'a> ByteStream<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        ByteStream { data, pos: 0, bit_pos: 7, eof: false }
    }

    pub fn eof(&self) -> bool {
        self.eof
    }

    /// Resets the EOF flag after the driver loop has already accounted for
    /// it (e.g. by emitting an invalid `on_frame_ready`), matching the
    /// reference decoder's fresh start for the next frame attempt.
    pub fn clear_eof(&mut self) {
        self.eof = false;
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    pub fn peek_char(&self) -> i32 {
        if self.pos >= self.data.len() {
            EOF
        } else {
            self.data[self.pos] as i32
        }
    }

    pub fn read_byte(&mut self) -> i32 {
        if self.pos >= self.data.len() {
            self.eof = true;
            return EOF;
        }
        let b = self.data[self.pos];
        self.pos += 1;
        b as i32
    }

    pub fn read_char(&mut self) -> i32 {
        self.read_byte()
    }

    /// Rewinds one byte. Only ever called right after a `read_char`/`read_byte`
    /// that wasn't consumed by the caller's grammar.
    pub fn unread_char(&mut self) {
        if self.pos > 0 {
            self.pos -= 1;
        }
    }

    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        let remaining = self.data.len().saturating_sub(self.pos);
        let n = buf.len().min(remaining);
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        if n < buf.len() {
            self.eof = true;
        }
        n
    }

    pub fn read_raw_float(&mut self) -> Option<f32> {
        let mut buf = [0u8; 4];
        if self.read(&mut buf) != 4 {
            return None;
        }
        Some(f32::from_le_bytes(buf))
    }

    /// Reads `num_bits` (<= 32) MSB-first, returning `None` at EOF.
    pub fn read_bits(&mut self, mut num_bits: u32) -> Option<u32> {
        if num_bits == 0 {
            return Some(0);
        }
        if num_bits > 32 {
            num_bits = 32;
        }
        let mut result: u32 = 0;
        let mut remaining = num_bits;
        while remaining > 0 {
            if self.pos >= self.data.len() {
                self.pos = self.data.len();
                self.eof = true;
                self.bit_pos = 7;
                return None;
            }
            let bit = (self.data[self.pos] >> self.bit_pos) & 1;
            remaining -= 1;
            result |= (bit as u32) << remaining;
            if self.bit_pos == 0 {
                self.bit_pos = 7;
                self.pos += 1;
            } else {
                self.bit_pos -= 1;
            }
        }
        Some(result)
    }

    pub fn read_bit(&mut self) -> Option<u32> {
        self.read_bits(1)
    }

    pub fn byte_align(&mut self) {
        if self.bit_pos != 7 {
            self.bit_pos = 7;
            self.pos += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_bits_is_msb_first() {
        let data = [0b1010_0000];
        let mut s = ByteStream::new(&data);
        assert_eq!(s.read_bits(3), Some(0b101));
        assert_eq!(s.read_bits(1), Some(0));
    }

    #[test]
    fn byte_align_advances_to_next_byte() {
        let data = [0xFF, 0x42];
        let mut s = ByteStream::new(&data);
        s.read_bits(3).unwrap();
        s.byte_align();
        assert_eq!(s.read_byte(), 0x42);
    }

    #[test]
    fn read_past_end_sets_eof() {
        let data = [0x01];
        let mut s = ByteStream::new(&data);
        assert_eq!(s.read_byte(), 0x01);
        assert_eq!(s.read_byte(), EOF);
        assert!(s.eof());
    }

    #[test]
    fn unread_char_rewinds_one_byte() {
        let data = [0x10, 0x20];
        let mut s = ByteStream::new(&data);
        assert_eq!(s.read_byte(), 0x10);
        s.unread_char();
        assert_eq!(s.read_byte(), 0x10);
        assert_eq!(s.read_byte(), 0x20);
    }
}
