//! OBC sensor collaborators and the scaling applied to their readings.
//!
//! Chip drivers live outside the library; they plug in through the traits
//! below. `SensorHub` polls them and writes the telemetry fields of the
//! `SharedContext`. A failed read keeps the previous value and is counted.

use core::f32::consts::PI;
use core::fmt::Debug;

#[allow(unused_imports)]
use micromath::F32Ext;

use crate::state::{GpsData, ImuData, Orientation, SharedContext};

/// ADS1115 counts at 3.31 V with the default gain (0.1875 mV/count).
pub const ADC_FULL_SCALE_COUNTS: i16 = 17_670;
pub const ADC_FULL_SCALE_VOLTS: f32 = 3.31;

const MAIN_BUS_CURRENT_RANGE: (f32, f32) = (0.0, 5.0);
const MAIN_BUS_VOLTAGE_RANGE: (f32, f32) = (10.0, 12.6);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AnalogChannel {
    MainBusCurrent = 0,
    MainBusVoltage = 1,
    BatteryTemperature = 2,
    Auxiliary = 3,
}

pub trait AnalogSource {
    type Error: Debug;
    fn read_channel(&mut self, channel: AnalogChannel) -> Result<i16, Self::Error>;
}

pub trait TemperatureSensor {
    type Error: Debug;
    fn read_celsius(&mut self) -> Result<f32, Self::Error>;
}

pub trait OrientationSensor {
    type Error: Debug;

    fn read_imu(&mut self) -> Result<ImuData, Self::Error>;

    /// Heading from the magnetometer, pitch and roll from gravity.
    fn read_orientation(&mut self) -> Result<Orientation, Self::Error> {
        let imu = self.read_imu()?;
        Ok(orientation_from(&imu))
    }
}

pub trait GpsSource {
    /// Latest decoded fix, if a new one arrived since the last call.
    fn poll_fix(&mut self) -> Option<GpsData>;
}

/// Clamp raw counts to the valid window. Negative reads are noise.
pub fn clamp_counts(raw: i16) -> i16 {
    raw.clamp(0, ADC_FULL_SCALE_COUNTS)
}

pub fn counts_to_volts(raw: i16) -> f32 {
    clamp_counts(raw) as f32 * ADC_FULL_SCALE_VOLTS / ADC_FULL_SCALE_COUNTS as f32
}

fn map_volts(volts: f32, (lo, hi): (f32, f32)) -> f32 {
    lo + volts / ADC_FULL_SCALE_VOLTS * (hi - lo)
}

/// Engineering value of an analog channel; channels with no scaling read 0.
pub fn scale_channel(channel: AnalogChannel, raw: i16) -> f32 {
    let volts = counts_to_volts(raw);
    match channel {
        AnalogChannel::MainBusCurrent => map_volts(volts, MAIN_BUS_CURRENT_RANGE),
        AnalogChannel::MainBusVoltage => map_volts(volts, MAIN_BUS_VOLTAGE_RANGE),
        AnalogChannel::BatteryTemperature | AnalogChannel::Auxiliary => 0.0,
    }
}

/// Compass heading in `[0, 360)` degrees from magnetometer X/Y.
pub fn heading_deg(mag_x: f32, mag_y: f32) -> f32 {
    let deg = mag_y.atan2(mag_x) * 180.0 / PI;
    let deg = if deg < 0.0 { deg + 360.0 } else { deg };
    if deg >= 360.0 {
        0.0
    } else {
        deg
    }
}

pub fn orientation_from(imu: &ImuData) -> Orientation {
    let [ax, ay, az] = imu.accel;
    Orientation {
        heading_deg: heading_deg(imu.mag[0], imu.mag[1]),
        pitch_deg: (-ax).atan2((ay * ay + az * az).sqrt()) * 180.0 / PI,
        roll_deg: ay.atan2(az) * 180.0 / PI,
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SensorErrors {
    pub adc: u32,
    pub temperature: u32,
    pub imu: u32,
}

pub struct SensorHub<A, T, O, G> {
    adc: A,
    temperature: T,
    imu: O,
    gps: G,
    errors: SensorErrors,
}

impl<A, T, O, G> SensorHub<A, T, O, G>
where
    A: AnalogSource,
    T: TemperatureSensor,
    O: OrientationSensor,
    G: GpsSource,
{
    pub fn new(adc: A, temperature: T, imu: O, gps: G) -> Self {
        Self {
            adc,
            temperature,
            imu,
            gps,
            errors: SensorErrors::default(),
        }
    }

    /// Bus voltage, bus current and battery temperature.
    pub fn sample_power(&mut self, ctx: &mut SharedContext) {
        match self.adc.read_channel(AnalogChannel::MainBusVoltage) {
            Ok(raw) => ctx.power.bus_voltage = scale_channel(AnalogChannel::MainBusVoltage, raw),
            Err(_) => self.errors.adc += 1,
        }
        match self.adc.read_channel(AnalogChannel::MainBusCurrent) {
            Ok(raw) => ctx.power.bus_current = scale_channel(AnalogChannel::MainBusCurrent, raw),
            Err(_) => self.errors.adc += 1,
        }
        match self.temperature.read_celsius() {
            Ok(c) => ctx.power.temperature_c = c,
            Err(_) => {
                self.errors.temperature += 1;
                debug!("battery temperature read failed");
            }
        }
    }

    /// Raw IMU axes plus derived orientation, and any new GPS fix.
    pub fn sample_motion(&mut self, ctx: &mut SharedContext) {
        match self.imu.read_imu() {
            Ok(imu) => {
                ctx.imu = imu;
                ctx.orientation = orientation_from(&imu);
            }
            Err(_) => self.errors.imu += 1,
        }
        if let Some(fix) = self.gps.poll_fix() {
            ctx.gps = fix;
        }
    }

    pub fn errors(&self) -> SensorErrors {
        self.errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::JoystickCalibration;

    fn close(a: f32, b: f32, tol: f32) -> bool {
        (a - b).abs() <= tol
    }

    #[test]
    fn counts_are_clamped() {
        assert_eq!(clamp_counts(-12), 0);
        assert_eq!(clamp_counts(20_000), ADC_FULL_SCALE_COUNTS);
        assert!(close(counts_to_volts(i16::MAX), 3.31, 1e-4));
    }

    #[test]
    fn bus_scaling() {
        assert!(close(scale_channel(AnalogChannel::MainBusVoltage, 0), 10.0, 1e-4));
        assert!(close(scale_channel(AnalogChannel::MainBusVoltage, 17_670), 12.6, 1e-4));
        assert!(close(scale_channel(AnalogChannel::MainBusCurrent, 8_835), 2.5, 1e-3));
        assert_eq!(scale_channel(AnalogChannel::Auxiliary, 9000), 0.0);
    }

    #[test]
    fn heading_is_normalised() {
        assert!(close(heading_deg(1.0, 0.0), 0.0, 0.5));
        assert!(close(heading_deg(0.0, 1.0), 90.0, 0.5));
        assert!(close(heading_deg(-1.0, 0.0), 180.0, 0.5));
        assert!(close(heading_deg(0.0, -1.0), 270.0, 0.5));
        for i in 0..72 {
            let a = i as f32 * 5.0 * PI / 180.0;
            let h = heading_deg(a.cos(), a.sin());
            assert!((0.0..360.0).contains(&h));
        }
    }

    #[test]
    fn level_imu_has_zero_pitch_and_roll() {
        let imu = ImuData {
            accel: [0.0, 0.0, 9.81],
            mag: [0.0, 20.0, -40.0],
            ..Default::default()
        };
        let o = orientation_from(&imu);
        assert!(close(o.pitch_deg, 0.0, 0.5));
        assert!(close(o.roll_deg, 0.0, 0.5));
        assert!(close(o.heading_deg, 90.0, 0.5));
    }

    struct FixedAdc;
    impl AnalogSource for FixedAdc {
        type Error = ();
        fn read_channel(&mut self, channel: AnalogChannel) -> Result<i16, ()> {
            match channel {
                AnalogChannel::MainBusVoltage => Ok(17_670),
                _ => Err(()),
            }
        }
    }

    struct DeadProbe;
    impl TemperatureSensor for DeadProbe {
        type Error = ();
        fn read_celsius(&mut self) -> Result<f32, ()> {
            Err(())
        }
    }

    struct FlatImu;
    impl OrientationSensor for FlatImu {
        type Error = ();
        fn read_imu(&mut self) -> Result<ImuData, ()> {
            Ok(ImuData {
                accel: [0.0, 0.0, 9.81],
                mag: [1.0, 0.0, 0.0],
                ..Default::default()
            })
        }
    }

    struct OneFix(Option<GpsData>);
    impl GpsSource for OneFix {
        fn poll_fix(&mut self) -> Option<GpsData> {
            self.0.take()
        }
    }

    #[test]
    fn hub_keeps_old_values_on_failure() {
        let fix = GpsData { lat: 53.4, lon: -2.9, time: 120_000.0, fix: true };
        let mut hub = SensorHub::new(FixedAdc, DeadProbe, FlatImu, OneFix(Some(fix)));
        let mut ctx = SharedContext::new(&JoystickCalibration::DEFAULT);
        ctx.power.temperature_c = 21.0;
        ctx.power.bus_current = 1.2;

        hub.sample_power(&mut ctx);
        hub.sample_motion(&mut ctx);
        hub.sample_motion(&mut ctx);

        assert!(close(ctx.power.bus_voltage, 12.6, 1e-4));
        assert_eq!(ctx.power.bus_current, 1.2);
        assert_eq!(ctx.power.temperature_c, 21.0);
        assert_eq!(ctx.gps, fix);
        assert_eq!(hub.errors(), SensorErrors { adc: 1, temperature: 1, imu: 0 });
    }

    struct NoImu;
    impl OrientationSensor for NoImu {
        type Error = ();
        fn read_imu(&mut self) -> Result<ImuData, ()> {
            Err(())
        }
    }

    #[test]
    fn absent_motion_sensors_leave_telemetry_zeroed() {
        let mut hub = SensorHub::new(FixedAdc, DeadProbe, NoImu, OneFix(None));
        let mut ctx = SharedContext::new(&JoystickCalibration::DEFAULT);

        for _ in 0..3 {
            hub.sample_motion(&mut ctx);
        }

        assert_eq!(ctx.imu, ImuData::default());
        assert_eq!(ctx.gps, GpsData::default());
        assert!(!ctx.gps.fix);
        assert_eq!(hub.errors().imu, 3);
    }
}
