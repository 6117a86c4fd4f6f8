//! Fixed-layout binary codec.
//!
//! Every datagram is `[tag u8][record]`, the record being a fixed sequence of
//! little-endian integers and IEEE-754 floats with no padding. Record sizes are
//! constants so a receiver can check the length before it copies anything.

use heapless::Vec;

use crate::state::{ControlFlags, GpsData, ImuData, Orientation, PowerData};

/// Largest datagram the transport is expected to carry.
pub const MAX_DATAGRAM: usize = 64;

pub type Frame = Vec<u8, MAX_DATAGRAM>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MessageKind {
    TelemetryGps,
    TelemetryImu,
    TelemetryHousekeeping,
    TelecommandControl,
}

impl MessageKind {
    pub const fn tag(self) -> u8 {
        match self {
            Self::TelemetryGps => 0x01,
            Self::TelemetryImu => 0x02,
            Self::TelemetryHousekeeping => 0x03,
            Self::TelecommandControl => 0x10,
        }
    }

    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0x01 => Some(Self::TelemetryGps),
            0x02 => Some(Self::TelemetryImu),
            0x03 => Some(Self::TelemetryHousekeeping),
            0x10 => Some(Self::TelecommandControl),
            _ => None,
        }
    }

    /// Total datagram size including the tag byte.
    pub const fn wire_size(self) -> usize {
        1 + match self {
            // lat, lon, time, fix
            Self::TelemetryGps => 3 * 4 + 1,
            // gyro, accel, mag, heading, pitch, roll
            Self::TelemetryImu => 12 * 4,
            // voltage, current, temperature, rssi
            Self::TelemetryHousekeeping => 3 * 4 + 2,
            // command, x, y, encoder, flags, rssi
            Self::TelecommandControl => 2 + 2 + 2 + 2 + 1 + 2,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Telecommand {
    pub command: u16,
    pub joystick_x: u16,
    pub joystick_y: u16,
    pub encoder_pos: i16,
    pub flags: ControlFlags,
    /// Signal strength the CTU last measured on telemetry from the OBC.
    pub rssi: i16,
}

#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WireMessage {
    TelemetryGps(GpsData),
    TelemetryImu {
        imu: ImuData,
        orientation: Orientation,
    },
    TelemetryHousekeeping {
        power: PowerData,
        /// Signal strength the OBC last measured on telecommand.
        rssi: i16,
    },
    TelecommandControl(Telecommand),
}

impl WireMessage {
    pub const fn kind(&self) -> MessageKind {
        match self {
            Self::TelemetryGps(_) => MessageKind::TelemetryGps,
            Self::TelemetryImu { .. } => MessageKind::TelemetryImu,
            Self::TelemetryHousekeeping { .. } => MessageKind::TelemetryHousekeeping,
            Self::TelecommandControl(_) => MessageKind::TelecommandControl,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DecodeError {
    /// Leading byte is not a known tag (or the datagram was empty of a tag).
    UnknownType(u8),
    /// Shorter than the fixed size for the claimed tag.
    Truncated { expected: usize, actual: usize },
}

pub fn encode(message: &WireMessage) -> Frame {
    let mut w = Writer::default();
    w.u8(message.kind().tag());

    match message {
        WireMessage::TelemetryGps(gps) => {
            w.f32(gps.lat);
            w.f32(gps.lon);
            w.f32(gps.time);
            w.u8(gps.fix as u8);
        }
        WireMessage::TelemetryImu { imu, orientation } => {
            for axis in imu.gyro.iter().chain(&imu.accel).chain(&imu.mag) {
                w.f32(*axis);
            }
            w.f32(orientation.heading_deg);
            w.f32(orientation.pitch_deg);
            w.f32(orientation.roll_deg);
        }
        WireMessage::TelemetryHousekeeping { power, rssi } => {
            w.f32(power.bus_voltage);
            w.f32(power.bus_current);
            w.f32(power.temperature_c);
            w.i16(*rssi);
        }
        WireMessage::TelecommandControl(tc) => {
            w.u16(tc.command);
            w.u16(tc.joystick_x);
            w.u16(tc.joystick_y);
            w.i16(tc.encoder_pos);
            w.u8(tc.flags.to_bits());
            w.i16(tc.rssi);
        }
    }

    w.buf
}

/// Decode one datagram. Trailing bytes past the fixed record are ignored.
pub fn decode(data: &[u8]) -> Result<WireMessage, DecodeError> {
    let Some(&tag) = data.first() else {
        return Err(DecodeError::Truncated { expected: 1, actual: 0 });
    };
    let kind = MessageKind::from_tag(tag).ok_or(DecodeError::UnknownType(tag))?;

    let expected = kind.wire_size();
    if data.len() < expected {
        return Err(DecodeError::Truncated {
            expected,
            actual: data.len(),
        });
    }

    let mut r = Reader { data: &data[1..expected] };
    let message = match kind {
        MessageKind::TelemetryGps => WireMessage::TelemetryGps(GpsData {
            lat: r.f32(),
            lon: r.f32(),
            time: r.f32(),
            fix: r.u8() != 0,
        }),
        MessageKind::TelemetryImu => {
            let imu = ImuData {
                gyro: r.vec3(),
                accel: r.vec3(),
                mag: r.vec3(),
            };
            let orientation = Orientation {
                heading_deg: r.f32(),
                pitch_deg: r.f32(),
                roll_deg: r.f32(),
            };
            WireMessage::TelemetryImu { imu, orientation }
        }
        MessageKind::TelemetryHousekeeping => WireMessage::TelemetryHousekeeping {
            power: PowerData {
                bus_voltage: r.f32(),
                bus_current: r.f32(),
                temperature_c: r.f32(),
            },
            rssi: r.i16(),
        },
        MessageKind::TelecommandControl => WireMessage::TelecommandControl(Telecommand {
            command: r.u16(),
            joystick_x: r.u16(),
            joystick_y: r.u16(),
            encoder_pos: r.i16(),
            flags: ControlFlags::from_bits(r.u8()),
            rssi: r.i16(),
        }),
    };

    Ok(message)
}

#[derive(Default)]
struct Writer {
    buf: Frame,
}

impl Writer {
    fn bytes(&mut self, bytes: &[u8]) {
        // Every record fits in MAX_DATAGRAM; see `wire_sizes_fit_datagram`.
        let _ = self.buf.extend_from_slice(bytes);
    }

    fn u8(&mut self, v: u8) {
        self.bytes(&[v]);
    }

    fn u16(&mut self, v: u16) {
        self.bytes(&v.to_le_bytes());
    }

    fn i16(&mut self, v: i16) {
        self.bytes(&v.to_le_bytes());
    }

    fn f32(&mut self, v: f32) {
        self.bytes(&v.to_le_bytes());
    }
}

/// Reads from a slice already checked to hold the full record.
struct Reader<'a> {
    data: &'a [u8],
}

impl Reader<'_> {
    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        let n = N.min(self.data.len());
        out[..n].copy_from_slice(&self.data[..n]);
        self.data = &self.data[n..];
        out
    }

    fn u8(&mut self) -> u8 {
        self.take::<1>()[0]
    }

    fn u16(&mut self) -> u16 {
        u16::from_le_bytes(self.take())
    }

    fn i16(&mut self) -> i16 {
        i16::from_le_bytes(self.take())
    }

    fn f32(&mut self) -> f32 {
        f32::from_le_bytes(self.take())
    }

    fn vec3(&mut self) -> [f32; 3] {
        [self.f32(), self.f32(), self.f32()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_KINDS: [MessageKind; 4] = [
        MessageKind::TelemetryGps,
        MessageKind::TelemetryImu,
        MessageKind::TelemetryHousekeeping,
        MessageKind::TelecommandControl,
    ];

    fn samples() -> [WireMessage; 4] {
        [
            WireMessage::TelemetryGps(GpsData {
                lat: 53.408_37,
                lon: -2.991_57,
                time: 134_502.5,
                fix: true,
            }),
            WireMessage::TelemetryImu {
                imu: ImuData {
                    gyro: [0.01, -0.02, 0.5],
                    accel: [0.0, 0.1, 9.81],
                    mag: [22.5, -4.0, 41.0],
                },
                orientation: Orientation {
                    heading_deg: 350.2,
                    pitch_deg: -3.5,
                    roll_deg: 1.25,
                },
            },
            WireMessage::TelemetryHousekeeping {
                power: PowerData {
                    bus_voltage: 12.31,
                    bus_current: 2.4,
                    temperature_c: 31.5,
                },
                rssi: -67,
            },
            WireMessage::TelecommandControl(Telecommand {
                command: 0xD1,
                joystick_x: 4095,
                joystick_y: 12,
                encoder_pos: -42,
                flags: ControlFlags::from_bits(0b1100_0011),
                rssi: -80,
            }),
        ]
    }

    #[test]
    fn wire_sizes_fit_datagram() {
        assert_eq!(MessageKind::TelemetryGps.wire_size(), 14);
        assert_eq!(MessageKind::TelemetryImu.wire_size(), 49);
        assert_eq!(MessageKind::TelemetryHousekeeping.wire_size(), 15);
        assert_eq!(MessageKind::TelecommandControl.wire_size(), 12);
        for kind in ALL_KINDS {
            assert!(kind.wire_size() <= MAX_DATAGRAM);
            assert_eq!(MessageKind::from_tag(kind.tag()), Some(kind));
        }
    }

    #[test]
    fn every_variant_round_trips() {
        for msg in samples() {
            let bytes = encode(&msg);
            assert_eq!(bytes.len(), msg.kind().wire_size());
            assert_eq!(bytes[0], msg.kind().tag());
            assert_eq!(decode(&bytes), Ok(msg));
        }
    }

    #[test]
    fn telecommand_layout_is_little_endian() {
        let msg = WireMessage::TelecommandControl(Telecommand {
            command: 0x00DF,
            joystick_x: 0x0102,
            joystick_y: 0x0304,
            encoder_pos: -1,
            flags: ControlFlags::from_bits(0x80),
            rssi: -2,
        });
        assert_eq!(
            encode(&msg).as_slice(),
            &[0x10, 0xDF, 0x00, 0x02, 0x01, 0x04, 0x03, 0xFF, 0xFF, 0x80, 0xFE, 0xFF]
        );
    }

    #[test]
    fn truncated_datagram_is_rejected() {
        for msg in samples() {
            let bytes = encode(&msg);
            for len in 1..bytes.len() {
                assert_eq!(
                    decode(&bytes[..len]),
                    Err(DecodeError::Truncated {
                        expected: bytes.len(),
                        actual: len
                    })
                );
            }
        }
    }

    #[test]
    fn unknown_and_empty_datagrams() {
        assert_eq!(decode(&[0x7F, 0, 0, 0]), Err(DecodeError::UnknownType(0x7F)));
        assert_eq!(
            decode(&[]),
            Err(DecodeError::Truncated { expected: 1, actual: 0 })
        );
    }

    #[test]
    fn trailing_bytes_are_ignored() {
        let msg = samples()[2];
        let mut bytes = encode(&msg);
        bytes.extend_from_slice(&[0xAA, 0xBB]).unwrap();
        assert_eq!(decode(&bytes), Ok(msg));
    }
}
