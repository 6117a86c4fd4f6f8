//! SLIP framing for the UART radio modem.

use heapless::Vec;

pub const END: u8 = 0xC0;
pub const ESC: u8 = 0xDB;
pub const ESC_END: u8 = 0xDC;
pub const ESC_ESC: u8 = 0xDD;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SlipError {
    BufferTooSmall,
    FrameTooLarge,
    InvalidEscape(u8),
}

/// Worst-case encoded size of an `n`-byte frame.
pub const fn encoded_len(n: usize) -> usize {
    2 * n + 2
}

/// Frame `data` between two END bytes, escaping as needed. Returns the number
/// of bytes written to `out`.
pub fn encode(data: &[u8], out: &mut [u8]) -> Result<usize, SlipError> {
    let mut len = 0;
    let mut put = |bytes: &[u8]| -> Result<(), SlipError> {
        let dst = out
            .get_mut(len..len + bytes.len())
            .ok_or(SlipError::BufferTooSmall)?;
        dst.copy_from_slice(bytes);
        len += bytes.len();
        Ok(())
    };

    put(&[END])?;
    for &byte in data {
        match byte {
            END => put(&[ESC, ESC_END])?,
            ESC => put(&[ESC, ESC_ESC])?,
            b => put(&[b])?,
        }
    }
    put(&[END])?;

    Ok(len)
}

/// Byte-at-a-time decoder. After an error the partial frame is dropped and
/// decoding resumes at the next END.
pub struct SlipDecoder<const N: usize> {
    buf: Vec<u8, N>,
    escaped: bool,
    discarding: bool,
}

impl<const N: usize> SlipDecoder<N> {
    pub const fn new() -> Self {
        Self {
            buf: Vec::new(),
            escaped: false,
            discarding: false,
        }
    }

    /// Feed one byte. Returns the frame `byte` closes, if any. Empty frames
    /// (back-to-back END bytes) are skipped.
    pub fn push(&mut self, byte: u8) -> Result<Option<Vec<u8, N>>, SlipError> {
        if byte == END {
            let discarded = core::mem::replace(&mut self.discarding, false);
            self.escaped = false;
            let frame = core::mem::take(&mut self.buf);
            return Ok((!discarded && !frame.is_empty()).then_some(frame));
        }
        if self.discarding {
            return Ok(None);
        }

        let decoded = if core::mem::replace(&mut self.escaped, false) {
            match byte {
                ESC_END => END,
                ESC_ESC => ESC,
                other => return Err(self.fail(SlipError::InvalidEscape(other))),
            }
        } else if byte == ESC {
            self.escaped = true;
            return Ok(None);
        } else {
            byte
        };

        if self.buf.push(decoded).is_err() {
            return Err(self.fail(SlipError::FrameTooLarge));
        }
        Ok(None)
    }

    pub fn reset(&mut self) {
        self.buf.clear();
        self.escaped = false;
        self.discarding = false;
    }

    fn fail(&mut self, err: SlipError) -> SlipError {
        self.buf.clear();
        self.escaped = false;
        self.discarding = true;
        err
    }
}

impl<const N: usize> Default for SlipDecoder<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all<const N: usize>(dec: &mut SlipDecoder<N>, bytes: &[u8]) -> Vec<Vec<u8, N>, 4> {
        let mut frames = Vec::new();
        for &b in bytes {
            if let Ok(Some(frame)) = dec.push(b) {
                frames.push(frame).unwrap();
            }
        }
        frames
    }

    #[test]
    fn escapes_reserved_bytes() {
        let mut out = [0u8; 16];
        let n = encode(&[0x01, END, ESC, 0x02], &mut out).unwrap();
        assert_eq!(&out[..n], &[END, 0x01, ESC, ESC_END, ESC, ESC_ESC, 0x02, END]);
    }

    #[test]
    fn decodes_what_it_encodes() {
        let data = [END, ESC, 0x10, 0x00, 0xFF, ESC_END];
        let mut out = [0u8; encoded_len(6)];
        let n = encode(&data, &mut out).unwrap();

        let mut dec = SlipDecoder::<32>::new();
        let frames = decode_all(&mut dec, &out[..n]);
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], &data[..]);
    }

    #[test]
    fn small_output_buffer_is_an_error() {
        let mut out = [0u8; 4];
        assert_eq!(encode(&[END, END], &mut out), Err(SlipError::BufferTooSmall));
    }

    #[test]
    fn bad_escape_drops_frame_and_resyncs() {
        let mut dec = SlipDecoder::<16>::new();
        dec.push(END).unwrap();
        dec.push(0x01).unwrap();
        dec.push(ESC).unwrap();
        assert_eq!(dec.push(0x00), Err(SlipError::InvalidEscape(0x00)));
        // Rest of the broken frame is ignored, the next one decodes.
        let frames = decode_all(&mut dec, &[0x02, END, 0x03, 0x04, END]);
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], &[0x03, 0x04]);
    }

    #[test]
    fn oversized_frame_is_rejected() {
        let mut dec = SlipDecoder::<4>::new();
        for b in 0..4 {
            assert_eq!(dec.push(b), Ok(None));
        }
        assert_eq!(dec.push(4), Err(SlipError::FrameTooLarge));
        assert_eq!(dec.push(END), Ok(None));
        assert_eq!(decode_all(&mut dec, &[7, END]).len(), 1);
    }
}
