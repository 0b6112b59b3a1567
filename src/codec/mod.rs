//! Translation between raw MIDI byte streams and router events.
//!
//! The [`Codec`] keeps parser state between calls (running status, a partially
//! received message, an open system exclusive). Callers that treat every call
//! as a self-contained message reset the relevant direction first:
//! [`Codec::reset_encode`] before [`Codec::encode`], [`Codec::reset_decode`]
//! before [`Codec::decode`].

use thiserror::Error;

use crate::router::{EventKind, SeqEvent};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("data byte 0x{0:02X} without a status byte")]
    UnexpectedData(u8),
    #[error("undefined status byte 0x{0:02X}")]
    UndefinedStatus(u8),
    #[error("end of exclusive (0xF7) without a start")]
    StrayEndOfExclusive,
    #[error("incomplete MIDI message")]
    Incomplete,
    #[error("{0} event has no MIDI byte representation")]
    NotMidi(String),
    #[error("buffer too small: {needed} bytes needed, {available} available")]
    BufferTooSmall { needed: usize, available: usize },
}

/// Outcome of feeding one byte to the encoder.
enum Step {
    Pending,
    /// An event completed with this byte.
    Emit(EventKind),
    /// An event completed *before* this byte, which was not consumed.
    EmitBefore(EventKind),
}

#[derive(Debug)]
pub struct Codec {
    bufsize: usize,
    // encoder
    status: Option<u8>,
    data: [u8; 2],
    count: usize,
    sysex: Option<Vec<u8>>,
    // decoder
    running_status: bool,
    last_status: Option<u8>,
}

impl Codec {
    /// Creates a codec whose system exclusive buffer holds `bufsize` bytes.
    pub fn new(bufsize: usize) -> Self {
        Self {
            bufsize: bufsize.max(1),
            status: None,
            data: [0; 2],
            count: 0,
            sysex: None,
            running_status: true,
            last_status: None,
        }
    }

    pub fn bufsize(&self) -> usize {
        self.bufsize
    }

    /// Whether the decoder may omit a repeated channel status byte.
    pub fn enable_running_status(&mut self, enable: bool) {
        self.running_status = enable;
    }

    pub fn reset_encode(&mut self) {
        self.status = None;
        self.count = 0;
        self.sysex = None;
    }

    pub fn reset_decode(&mut self) {
        self.last_status = None;
    }

    /// Feeds bytes until one event is complete.
    ///
    /// Returns how many bytes were consumed and the event, if one completed.
    /// `Ok((bytes.len(), None))` means the input ended mid-message; the partial
    /// state is kept for the next call.
    pub fn encode(&mut self, bytes: &[u8]) -> Result<(usize, Option<SeqEvent>), CodecError> {
        for (i, &byte) in bytes.iter().enumerate() {
            match self.encode_byte(byte)? {
                Step::Pending => {}
                Step::Emit(kind) => return Ok((i + 1, Some(SeqEvent::new(kind)))),
                Step::EmitBefore(kind) => return Ok((i, Some(SeqEvent::new(kind)))),
            }
        }
        Ok((bytes.len(), None))
    }

    fn encode_byte(&mut self, byte: u8) -> Result<Step, CodecError> {
        if byte >= 0xF8 {
            // real-time bytes may appear anywhere and leave the parser alone
            return realtime_kind(byte).map(Step::Emit);
        }

        if let Some(sysex) = self.sysex.as_mut() {
            if byte == 0xF7 {
                sysex.push(byte);
                let sysex = self.sysex.take().unwrap_or_default();
                return Ok(Step::Emit(EventKind::Sysex(sysex)));
            }
            if byte & 0x80 != 0 {
                // a new status ends the exclusive without its terminator
                let sysex = self.sysex.take().unwrap_or_default();
                return Ok(Step::EmitBefore(EventKind::Sysex(sysex)));
            }
            sysex.push(byte);
            if sysex.len() >= self.bufsize {
                let chunk = std::mem::take(sysex);
                return Ok(Step::Emit(EventKind::Sysex(chunk)));
            }
            return Ok(Step::Pending);
        }

        if byte & 0x80 != 0 {
            self.count = 0;
            return match byte {
                0xF0 => {
                    self.status = None;
                    let mut sysex = Vec::with_capacity(self.bufsize.min(256));
                    sysex.push(byte);
                    self.sysex = Some(sysex);
                    Ok(Step::Pending)
                }
                0xF7 => {
                    self.status = None;
                    Err(CodecError::StrayEndOfExclusive)
                }
                0xF4 | 0xF5 => {
                    self.status = None;
                    Err(CodecError::UndefinedStatus(byte))
                }
                0xF6 => {
                    self.status = None;
                    Ok(Step::Emit(EventKind::TuneRequest))
                }
                _ => {
                    self.status = Some(byte);
                    Ok(Step::Pending)
                }
            };
        }

        let Some(status) = self.status else {
            return Err(CodecError::UnexpectedData(byte));
        };
        self.data[self.count] = byte;
        self.count += 1;
        if self.count < data_len(status) {
            return Ok(Step::Pending);
        }
        self.count = 0;
        if status >= 0xF0 {
            // system common messages cancel running status
            self.status = None;
        }
        Ok(Step::Emit(channel_or_common_kind(status, self.data)))
    }

    /// Writes the MIDI bytes for `event` into `buf` and returns their number.
    pub fn decode(&mut self, event: &SeqEvent, buf: &mut [u8]) -> Result<usize, CodecError> {
        let mut bytes = Vec::with_capacity(3);
        match &event.kind {
            EventKind::NoteOff {
                channel,
                note,
                velocity,
            } => self.channel_message(&mut bytes, 0x80, *channel, &[*note, *velocity]),
            EventKind::NoteOn {
                channel,
                note,
                velocity,
            } => self.channel_message(&mut bytes, 0x90, *channel, &[*note, *velocity]),
            EventKind::KeyPressure {
                channel,
                note,
                pressure,
            } => self.channel_message(&mut bytes, 0xA0, *channel, &[*note, *pressure]),
            EventKind::Controller {
                channel,
                param,
                value,
            } => self.channel_message(&mut bytes, 0xB0, *channel, &[*param, *value]),
            EventKind::ProgramChange { channel, program } => {
                self.channel_message(&mut bytes, 0xC0, *channel, &[*program])
            }
            EventKind::ChannelPressure { channel, pressure } => {
                self.channel_message(&mut bytes, 0xD0, *channel, &[*pressure])
            }
            EventKind::PitchBend { channel, value } => {
                let raw = (i32::from(*value) + 8192).clamp(0, 0x3FFF) as u16;
                let lsb = (raw & 0x7F) as u8;
                let msb = (raw >> 7) as u8;
                self.channel_message(&mut bytes, 0xE0, *channel, &[lsb, msb])
            }
            EventKind::QuarterFrame(value) => {
                self.last_status = None;
                bytes.extend_from_slice(&[0xF1, value & 0x7F]);
            }
            EventKind::SongPosition(position) => {
                self.last_status = None;
                let position = position & 0x3FFF;
                bytes.extend_from_slice(&[0xF2, (position & 0x7F) as u8, (position >> 7) as u8]);
            }
            EventKind::SongSelect(song) => {
                self.last_status = None;
                bytes.extend_from_slice(&[0xF3, song & 0x7F]);
            }
            EventKind::TuneRequest => {
                self.last_status = None;
                bytes.push(0xF6);
            }
            EventKind::Clock => bytes.push(0xF8),
            EventKind::Tick => bytes.push(0xF9),
            EventKind::Start => bytes.push(0xFA),
            EventKind::Continue => bytes.push(0xFB),
            EventKind::Stop => bytes.push(0xFC),
            EventKind::Sensing => bytes.push(0xFE),
            EventKind::Reset => bytes.push(0xFF),
            EventKind::Sysex(data) => {
                self.last_status = None;
                bytes.extend_from_slice(data);
            }
            EventKind::Echo => return Err(CodecError::NotMidi("echo".to_string())),
            EventKind::Unsupported(kind) => {
                return Err(CodecError::NotMidi(format!("type {}", kind)))
            }
        }

        if bytes.len() > buf.len() {
            return Err(CodecError::BufferTooSmall {
                needed: bytes.len(),
                available: buf.len(),
            });
        }
        buf[..bytes.len()].copy_from_slice(&bytes);
        Ok(bytes.len())
    }

    fn channel_message(&mut self, out: &mut Vec<u8>, command: u8, channel: u8, data: &[u8]) {
        let status = command | (channel & 0x0F);
        if !(self.running_status && self.last_status == Some(status)) {
            out.push(status);
        }
        self.last_status = Some(status);
        out.extend(data.iter().map(|byte| byte & 0x7F));
    }
}

fn data_len(status: u8) -> usize {
    match status & 0xF0 {
        0xC0 | 0xD0 => 1,
        0xF0 => match status {
            0xF1 | 0xF3 => 1,
            _ => 2,
        },
        _ => 2,
    }
}

fn realtime_kind(byte: u8) -> Result<EventKind, CodecError> {
    Ok(match byte {
        0xF8 => EventKind::Clock,
        0xF9 => EventKind::Tick,
        0xFA => EventKind::Start,
        0xFB => EventKind::Continue,
        0xFC => EventKind::Stop,
        0xFE => EventKind::Sensing,
        0xFF => EventKind::Reset,
        _ => return Err(CodecError::UndefinedStatus(byte)),
    })
}

fn channel_or_common_kind(status: u8, data: [u8; 2]) -> EventKind {
    let channel = status & 0x0F;
    match status & 0xF0 {
        0x80 => EventKind::NoteOff {
            channel,
            note: data[0],
            velocity: data[1],
        },
        0x90 => EventKind::NoteOn {
            channel,
            note: data[0],
            velocity: data[1],
        },
        0xA0 => EventKind::KeyPressure {
            channel,
            note: data[0],
            pressure: data[1],
        },
        0xB0 => EventKind::Controller {
            channel,
            param: data[0],
            value: data[1],
        },
        0xC0 => EventKind::ProgramChange {
            channel,
            program: data[0],
        },
        0xD0 => EventKind::ChannelPressure {
            channel,
            pressure: data[0],
        },
        0xE0 => EventKind::PitchBend {
            channel,
            value: ((i16::from(data[1]) << 7) | i16::from(data[0])) - 8192,
        },
        _ => match status {
            0xF1 => EventKind::QuarterFrame(data[0]),
            0xF2 => EventKind::SongPosition(u16::from(data[0]) | (u16::from(data[1]) << 7)),
            _ => EventKind::SongSelect(data[0]),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BUFFER_SIZE;

    fn encode_one(codec: &mut Codec, bytes: &[u8]) -> EventKind {
        codec.reset_encode();
        let (consumed, event) = codec.encode(bytes).unwrap();
        assert_eq!(consumed, bytes.len());
        event.expect("complete event").kind
    }

    fn round_trip(bytes: &[u8]) -> Vec<u8> {
        let mut codec = Codec::new(BUFFER_SIZE);
        codec.reset_encode();
        let (_, event) = codec.encode(bytes).unwrap();
        let event = event.expect("complete event");
        let mut buf = [0u8; BUFFER_SIZE];
        codec.reset_decode();
        let n = codec.decode(&event, &mut buf).unwrap();
        buf[..n].to_vec()
    }

    #[test]
    fn test_note_on() {
        let mut codec = Codec::new(BUFFER_SIZE);
        assert_eq!(
            encode_one(&mut codec, &[0x90, 0x40, 0x7F]),
            EventKind::NoteOn {
                channel: 0,
                note: 0x40,
                velocity: 0x7F
            }
        );
    }

    #[test]
    fn test_channel_messages_round_trip() {
        let messages: &[&[u8]] = &[
            &[0x80, 60, 0],
            &[0x9F, 60, 100],
            &[0x90, 60, 0],
            &[0xA3, 10, 20],
            &[0xB0, 7, 127],
            &[0xC5, 42],
            &[0xD1, 99],
            &[0xE0, 0x00, 0x40],
            &[0xE2, 0x7F, 0x7F],
            &[0xE2, 0x00, 0x00],
        ];
        for message in messages {
            assert_eq!(round_trip(message), message.to_vec(), "{:02X?}", message);
        }
    }

    #[test]
    fn test_system_messages_round_trip() {
        let messages: &[&[u8]] = &[
            &[0xF1, 0x35],
            &[0xF2, 0x10, 0x20],
            &[0xF3, 5],
            &[0xF6],
            &[0xF8],
            &[0xF9],
            &[0xFA],
            &[0xFB],
            &[0xFC],
            &[0xFE],
            &[0xFF],
            &[0xF0, 0x7E, 0x7F, 0x09, 0x01, 0xF7],
        ];
        for message in messages {
            assert_eq!(round_trip(message), message.to_vec(), "{:02X?}", message);
        }
    }

    #[test]
    fn test_pitch_bend_is_centered() {
        let mut codec = Codec::new(BUFFER_SIZE);
        assert_eq!(
            encode_one(&mut codec, &[0xE0, 0x00, 0x40]),
            EventKind::PitchBend {
                channel: 0,
                value: 0
            }
        );
        assert_eq!(
            encode_one(&mut codec, &[0xE0, 0x00, 0x00]),
            EventKind::PitchBend {
                channel: 0,
                value: -8192
            }
        );
        assert_eq!(
            encode_one(&mut codec, &[0xE0, 0x7F, 0x7F]),
            EventKind::PitchBend {
                channel: 0,
                value: 8191
            }
        );
    }

    #[test]
    fn test_incomplete_message_yields_no_event() {
        let mut codec = Codec::new(BUFFER_SIZE);
        assert_eq!(codec.encode(&[0x90, 0x40]).unwrap(), (2, None));
        assert_eq!(codec.encode(&[]).unwrap(), (0, None));
    }

    #[test]
    fn test_partial_state_survives_without_reset() {
        let mut codec = Codec::new(BUFFER_SIZE);
        assert_eq!(codec.encode(&[0x90, 0x40]).unwrap(), (2, None));
        let (consumed, event) = codec.encode(&[0x7F]).unwrap();
        assert_eq!(consumed, 1);
        assert!(matches!(
            event.unwrap().kind,
            EventKind::NoteOn { velocity: 0x7F, .. }
        ));

        codec.encode(&[0x90, 0x40]).unwrap();
        codec.reset_encode();
        assert_eq!(
            codec.encode(&[0x7F]),
            Err(CodecError::UnexpectedData(0x7F))
        );
    }

    #[test]
    fn test_running_status_on_encode() {
        let mut codec = Codec::new(BUFFER_SIZE);
        let bytes = [0x90, 60, 100, 62, 100];
        let (consumed, first) = codec.encode(&bytes).unwrap();
        assert_eq!(consumed, 3);
        assert!(first.is_some());
        let (consumed, second) = codec.encode(&bytes[3..]).unwrap();
        assert_eq!(consumed, 2);
        assert_eq!(
            second.unwrap().kind,
            EventKind::NoteOn {
                channel: 0,
                note: 62,
                velocity: 100
            }
        );
    }

    #[test]
    fn test_running_status_on_decode() {
        let mut codec = Codec::new(BUFFER_SIZE);
        let event = SeqEvent::new(EventKind::NoteOn {
            channel: 0,
            note: 60,
            velocity: 1,
        });
        let mut buf = [0u8; 8];
        assert_eq!(codec.decode(&event, &mut buf).unwrap(), 3);
        assert_eq!(codec.decode(&event, &mut buf).unwrap(), 2);
        codec.reset_decode();
        assert_eq!(codec.decode(&event, &mut buf).unwrap(), 3);

        codec.enable_running_status(false);
        assert_eq!(codec.decode(&event, &mut buf).unwrap(), 3);
        assert_eq!(codec.decode(&event, &mut buf).unwrap(), 3);
    }

    #[test]
    fn test_realtime_byte_inside_message() {
        let mut codec = Codec::new(BUFFER_SIZE);
        let (consumed, event) = codec.encode(&[0x90, 0xF8, 0x40, 0x7F]).unwrap();
        assert_eq!(consumed, 2);
        assert_eq!(event.unwrap().kind, EventKind::Clock);
        let (consumed, event) = codec.encode(&[0x40, 0x7F]).unwrap();
        assert_eq!(consumed, 2);
        assert!(matches!(event.unwrap().kind, EventKind::NoteOn { .. }));
    }

    #[test]
    fn test_malformed_input() {
        let mut codec = Codec::new(BUFFER_SIZE);
        assert_eq!(codec.encode(&[0x40]), Err(CodecError::UnexpectedData(0x40)));
        assert_eq!(codec.encode(&[0xF4]), Err(CodecError::UndefinedStatus(0xF4)));
        assert_eq!(codec.encode(&[0xFD]), Err(CodecError::UndefinedStatus(0xFD)));
        assert_eq!(codec.encode(&[0xF7]), Err(CodecError::StrayEndOfExclusive));
    }

    #[test]
    fn test_sysex_fills_buffer() {
        let mut codec = Codec::new(8);
        let mut bytes = vec![0xF0];
        bytes.extend(std::iter::repeat(0x11).take(10));
        let (consumed, event) = codec.encode(&bytes).unwrap();
        assert_eq!(consumed, 8);
        assert_eq!(event.unwrap().kind, EventKind::Sysex(bytes[..8].to_vec()));
    }

    #[test]
    fn test_sysex_interrupted_by_status() {
        let mut codec = Codec::new(BUFFER_SIZE);
        let (consumed, event) = codec.encode(&[0xF0, 0x01, 0x02, 0x90, 60, 1]).unwrap();
        assert_eq!(consumed, 3);
        assert_eq!(event.unwrap().kind, EventKind::Sysex(vec![0xF0, 0x01, 0x02]));
    }

    #[test]
    fn test_decode_rejects_non_midi_and_small_buffers() {
        let mut codec = Codec::new(BUFFER_SIZE);
        let mut buf = [0u8; 2];
        assert!(matches!(
            codec.decode(&SeqEvent::new(EventKind::Echo), &mut buf),
            Err(CodecError::NotMidi(_))
        ));
        let note = SeqEvent::new(EventKind::NoteOn {
            channel: 0,
            note: 1,
            velocity: 1,
        });
        assert_eq!(
            codec.decode(&note, &mut buf),
            Err(CodecError::BufferTooSmall {
                needed: 3,
                available: 2
            })
        );
    }
}
