#![cfg_attr(not(test), no_std)]

//! XR4 rover link and state coordination core.
//!
//! Shared by the two node binaries: the on-board computer (`xr4-obc`), which
//! owns motors and sensors, and the control & telemetry unit (`xr4-ctu`), which
//! owns the joystick and switches. Nothing in the library touches a HAL type;
//! the board glue lives behind the `board` feature.

// Must come first so the logging macros are visible to every module below.
#[macro_use]
mod fmt;

pub mod calibration;
pub mod config;
pub mod control;
pub mod display;
pub mod fsm;
pub mod inputs;
pub mod link;
pub mod node;
pub mod protocol;
pub mod sensors;
pub mod state;

#[cfg(feature = "board")]
pub mod board;
#[cfg(feature = "board")]
pub mod drivers;
#[cfg(feature = "board")]
pub mod tasks;
#[cfg(feature = "board")]
pub mod usb;

pub use config::NodeConfig;
pub use state::{Role, SafetyLatch, SharedContext, SystemState};
