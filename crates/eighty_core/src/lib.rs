//! Intel 8080 interpreter core.
//!
//! The crate is host-agnostic: it owns registers, flags and the 64 KiB
//! address space, and talks to the outside world only through the
//! [`PortIo`] trait. Machines (arcade boards, CP/M-style test harnesses)
//! are built on top of [`Cpu`] in separate crates.

pub mod alu;
pub mod cpu;
pub mod decode;
pub mod error;
pub mod registers;

pub use alu::{Alu, FlagMask, Operation};
pub use cpu::{Cpu, PortIo, MEMORY_SIZE};
pub use error::CoreError;
pub use registers::{Register, RegisterPair, RegisterSet};
