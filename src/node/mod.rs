//! Per-role main-loop cycle.
//!
//! Each node owns its `SharedContext` and runs one `cycle` per main-loop
//! iteration. The interrupt side reaches it only through the `SafetyLatch`,
//! the `Dispatcher` mailbox and (on the CTU) `SwitchFlags`.

mod ctu;
mod obc;

pub use ctu::{CtuInputs, CtuNode, CHORD_HOLD, COMMAND_REPEATS};
pub use obc::ObcNode;

use crate::control::ControlOutput;
use crate::link::{LinkStatus, SendResult};
use crate::protocol::MessageKind;
use crate::state::SystemState;

/// What one main-loop iteration did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CycleReport {
    pub state: SystemState,
    /// Drive command left in the latch at the end of the cycle.
    pub output: ControlOutput,
    pub sent: Option<(MessageKind, SendResult)>,
    pub link: LinkStatus,
}
