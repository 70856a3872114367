//! Space Invaders arcade board built on the 8080 core.
//!
//! The board contributes everything the bare CPU lacks: the port-mapped
//! shift register, input ports and DIP switches, sound latches, and the
//! two-interrupts-per-frame video cadence.

pub mod machine;

pub use machine::{Button, DipConfig, InvadersMachine, InvadersPorts};

/// Logical screen width in pixels (the tube is 224x256, rotated).
pub const SCREEN_WIDTH: usize = 224;
/// Logical screen height in pixels.
pub const SCREEN_HEIGHT: usize = 256;
