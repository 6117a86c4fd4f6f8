//! Board peripherals behind the library's collaborator traits.

pub mod analog;
pub mod dshot;
pub mod flash;
