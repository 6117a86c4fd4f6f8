//! Persisted joystick neutral points.
//!
//! Stored as a small fixed record: `"XR4J"`, x neutral, y neutral (u16 LE),
//! CRC-16/CCITT-FALSE over the preceding bytes. Erased flash (all 0xFF) fails
//! the magic check and reads as "nothing stored".

use core::fmt::Debug;

use crate::control::JoystickCalibration;

pub const RECORD_LEN: usize = 10;
const MAGIC: [u8; 4] = *b"XR4J";

pub trait CalibrationStore {
    type Error: Debug;

    /// Raw record bytes, whatever is in the slot.
    fn read_record(&mut self) -> Result<[u8; RECORD_LEN], Self::Error>;
    fn write_record(&mut self, record: &[u8; RECORD_LEN]) -> Result<(), Self::Error>;

    /// Stored neutrals applied over `base`, or `None` if nothing valid is
    /// stored.
    fn load(&mut self, base: &JoystickCalibration) -> Result<Option<JoystickCalibration>, Self::Error> {
        let record = self.read_record()?;
        Ok(decode_record(&record).map(|(x, y)| JoystickCalibration {
            x_neutral: x,
            y_neutral: y,
            ..*base
        }))
    }

    fn save(&mut self, cal: &JoystickCalibration) -> Result<(), Self::Error> {
        self.write_record(&encode_record(cal.x_neutral, cal.y_neutral))
    }
}

/// Load the stored calibration, falling back to `base` on any failure.
pub fn load_or<S: CalibrationStore>(store: &mut S, base: &JoystickCalibration) -> JoystickCalibration {
    match store.load(base) {
        Ok(Some(cal)) => {
            info!("joystick calibration loaded: x={} y={}", cal.x_neutral, cal.y_neutral);
            cal
        }
        Ok(None) => {
            info!("no stored joystick calibration, using defaults");
            *base
        }
        Err(_) => {
            warn!("calibration store read failed, using defaults");
            *base
        }
    }
}

pub fn encode_record(x_neutral: u16, y_neutral: u16) -> [u8; RECORD_LEN] {
    let mut rec = [0u8; RECORD_LEN];
    rec[..4].copy_from_slice(&MAGIC);
    rec[4..6].copy_from_slice(&x_neutral.to_le_bytes());
    rec[6..8].copy_from_slice(&y_neutral.to_le_bytes());
    let crc = crc16_ccitt_false(&rec[..8]);
    rec[8..].copy_from_slice(&crc.to_le_bytes());
    rec
}

pub fn decode_record(rec: &[u8; RECORD_LEN]) -> Option<(u16, u16)> {
    if rec[..4] != MAGIC {
        return None;
    }
    let crc = u16::from_le_bytes([rec[8], rec[9]]);
    if crc != crc16_ccitt_false(&rec[..8]) {
        return None;
    }
    Some((
        u16::from_le_bytes([rec[4], rec[5]]),
        u16::from_le_bytes([rec[6], rec[7]]),
    ))
}

pub fn crc16_ccitt_false(bytes: &[u8]) -> u16 {
    bytes.iter().fold(0xFFFF, |mut crc, &b| {
        crc ^= (b as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
        crc
    })
}

/// Volatile store; the record survives until reset.
pub struct RamStore {
    record: [u8; RECORD_LEN],
}

impl RamStore {
    pub const fn new() -> Self {
        Self {
            record: [0xFF; RECORD_LEN],
        }
    }
}

impl Default for RamStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CalibrationStore for RamStore {
    type Error = core::convert::Infallible;

    fn read_record(&mut self) -> Result<[u8; RECORD_LEN], Self::Error> {
        Ok(self.record)
    }

    fn write_record(&mut self, record: &[u8; RECORD_LEN]) -> Result<(), Self::Error> {
        self.record = *record;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc_check_value() {
        assert_eq!(crc16_ccitt_false(b"123456789"), 0x29B1);
    }

    #[test]
    fn empty_store_falls_back() {
        let mut store = RamStore::new();
        let base = JoystickCalibration::DEFAULT;
        assert_eq!(store.load(&base).unwrap(), None);
        assert_eq!(load_or(&mut store, &base), base);
    }

    #[test]
    fn saved_neutrals_are_loaded_over_base() {
        let mut store = RamStore::new();
        let base = JoystickCalibration::DEFAULT;
        let captured = JoystickCalibration { x_neutral: 2117, y_neutral: 2090, ..base };
        store.save(&captured).unwrap();

        let wider = JoystickCalibration { deadband: 80, ..base };
        let loaded = load_or(&mut store, &wider);
        assert_eq!((loaded.x_neutral, loaded.y_neutral), (2117, 2090));
        assert_eq!(loaded.deadband, 80);
    }

    #[test]
    fn corrupted_record_is_ignored() {
        let mut rec = encode_record(2000, 2000);
        rec[5] ^= 0x01;
        assert_eq!(decode_record(&rec), None);
    }
}
