//! Embassy tasks for both boards.
//!
//! The radio, E-STOP, encoder and ESC tasks are the "interrupt side": they
//! touch only the `SafetyLatch`, `SwitchFlags`, `LinkStats` and the
//! `Dispatcher` mailbox. Each node's main loop task owns its node and
//! everything else.

pub mod ctu_loop;
pub mod encoder_task;
pub mod esc_task;
pub mod estop_task;
pub mod obc_loop;
pub mod radio_task;
