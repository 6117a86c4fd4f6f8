//! Datagram payload format shared by both nodes.

mod wire;

pub use wire::{
    decode, encode, DecodeError, Frame, MessageKind, Telecommand, WireMessage, MAX_DATAGRAM,
};
