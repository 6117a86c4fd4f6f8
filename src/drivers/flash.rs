//! W25Qxx SPI NOR holding the joystick calibration record.

use embassy_stm32::gpio::{AnyPin, Output};
use embassy_stm32::spi::{self, Instance, Spi};

use crate::calibration::{CalibrationStore, RECORD_LEN};

const CMD_JEDEC_ID: u8 = 0x9F;
const CMD_READ: u8 = 0x03;
const CMD_PAGE_PROGRAM: u8 = 0x02;
const CMD_SECTOR_ERASE: u8 = 0x20;
const CMD_WRITE_ENABLE: u8 = 0x06;
const CMD_READ_STATUS: u8 = 0x05;
const STATUS_BUSY: u8 = 0x01;

fn command(cmd: u8, addr: u32) -> [u8; 4] {
    let a = addr.to_be_bytes();
    [cmd, a[1], a[2], a[3]]
}

/// First 4 KiB sector; nothing else lives on the chip.
const RECORD_ADDR: u32 = 0x0000_0000;

/// Sector erase is specified at 400 ms worst case; poll every ~1 us.
const BUSY_POLLS: u32 = 500_000;
const POLL_DELAY_CYCLES: u32 = 168;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlashError {
    Spi(spi::Error),
    Timeout,
}

impl From<spi::Error> for FlashError {
    fn from(e: spi::Error) -> Self {
        Self::Spi(e)
    }
}

pub struct W25qxx<'d, T: Instance, Tx, Rx> {
    spi: Spi<'d, T, Tx, Rx>,
    cs: Output<'d, AnyPin>,
}

impl<'d, T: Instance, Tx, Rx> W25qxx<'d, T, Tx, Rx> {
    pub fn new(spi: Spi<'d, T, Tx, Rx>, cs: Output<'d, AnyPin>) -> Self {
        Self { spi, cs }
    }

    pub fn read_id(&mut self) -> Result<[u8; 3], FlashError> {
        let mut id = [0u8; 3];
        self.transaction(&[CMD_JEDEC_ID], |spi| spi.blocking_read(&mut id))?;
        Ok(id)
    }

    fn transaction<F>(&mut self, header: &[u8], body: F) -> Result<(), FlashError>
    where
        F: FnOnce(&mut Spi<'d, T, Tx, Rx>) -> Result<(), spi::Error>,
    {
        self.cs.set_low();
        let result = self.spi.blocking_write(header).and_then(|()| body(&mut self.spi));
        self.cs.set_high();
        result.map_err(FlashError::from)
    }

    fn write_enable(&mut self) -> Result<(), FlashError> {
        self.transaction(&[CMD_WRITE_ENABLE], |_| Ok(()))
    }

    fn wait_idle(&mut self) -> Result<(), FlashError> {
        for _ in 0..BUSY_POLLS {
            let mut status = [0u8; 1];
            self.transaction(&[CMD_READ_STATUS], |spi| spi.blocking_read(&mut status))?;
            if status[0] & STATUS_BUSY == 0 {
                return Ok(());
            }
            cortex_m::asm::delay(POLL_DELAY_CYCLES);
        }
        Err(FlashError::Timeout)
    }
}

impl<T: Instance, Tx, Rx> CalibrationStore for W25qxx<'_, T, Tx, Rx> {
    type Error = FlashError;

    fn read_record(&mut self) -> Result<[u8; RECORD_LEN], FlashError> {
        let mut record = [0u8; RECORD_LEN];
        let header = command(CMD_READ, RECORD_ADDR);
        self.transaction(&header, |spi| spi.blocking_read(&mut record))?;
        Ok(record)
    }

    fn write_record(&mut self, record: &[u8; RECORD_LEN]) -> Result<(), FlashError> {
        self.write_enable()?;
        let erase = command(CMD_SECTOR_ERASE, RECORD_ADDR);
        self.transaction(&erase, |_| Ok(()))?;
        self.wait_idle()?;

        self.write_enable()?;
        let program = command(CMD_PAGE_PROGRAM, RECORD_ADDR);
        self.transaction(&program, |spi| spi.blocking_write(record))?;
        self.wait_idle()
    }
}
