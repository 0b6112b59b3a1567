use std::fmt;

use crate::config::BUFFER_SIZE;

/// Raw MIDI bytes bounded to the device buffer capacity.
///
/// Anything beyond [`BUFFER_SIZE`] bytes is cut off when the payload is
/// built; [`MidiPayload::dropped`] tells how many bytes were lost.
#[derive(Clone)]
pub struct MidiPayload {
    data: [u8; BUFFER_SIZE],
    len: usize,
    dropped: usize,
}

impl MidiPayload {
    pub fn new(bytes: &[u8]) -> Self {
        let len = bytes.len().min(BUFFER_SIZE);
        let mut data = [0u8; BUFFER_SIZE];
        data[..len].copy_from_slice(&bytes[..len]);
        Self {
            data,
            len,
            dropped: bytes.len() - len,
        }
    }

    /// Builds a payload from integers, keeping only the low byte of each.
    pub fn from_values<I>(values: I) -> Self
    where
        I: IntoIterator<Item = i64>,
    {
        let mut data = [0u8; BUFFER_SIZE];
        let mut len = 0;
        let mut dropped = 0;
        for value in values {
            if len < BUFFER_SIZE {
                data[len] = (value & 0xFF) as u8;
                len += 1;
            } else {
                dropped += 1;
            }
        }
        Self { data, len, dropped }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes that did not fit.
    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

impl fmt::Debug for MidiPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MidiPayload")
            .field("bytes", &self.as_bytes())
            .field("dropped", &self.dropped)
            .finish()
    }
}

impl PartialEq for MidiPayload {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes() && self.dropped == other.dropped
    }
}

impl Eq for MidiPayload {}

impl From<&[u8]> for MidiPayload {
    fn from(bytes: &[u8]) -> Self {
        MidiPayload::new(bytes)
    }
}

impl From<Vec<u8>> for MidiPayload {
    fn from(bytes: Vec<u8>) -> Self {
        MidiPayload::new(&bytes)
    }
}

impl From<&Vec<u8>> for MidiPayload {
    fn from(bytes: &Vec<u8>) -> Self {
        MidiPayload::new(bytes)
    }
}

impl<const N: usize> From<[u8; N]> for MidiPayload {
    fn from(bytes: [u8; N]) -> Self {
        MidiPayload::new(&bytes)
    }
}

impl<const N: usize> From<&[u8; N]> for MidiPayload {
    fn from(bytes: &[u8; N]) -> Self {
        MidiPayload::new(bytes)
    }
}
