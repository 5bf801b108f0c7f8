//! Emulator core for a 32-bit RISC-V machine implementing the I, M, A, F,
//! and D extensions together with the Zicsr CSR space and an Sv32-style
//! address translator.
//!
//! The crate is organised along the machine's architectural seams:
//!
//! - [`instruction`] decodes raw 32-bit words into typed instruction records.
//! - [`memory`] is the shared physical memory fabric: mapped regions,
//!   non-faulting peeks, atomic read-modify-write, and LR/SC reservations.
//! - [`timer`] is the memory-mapped `mtime`/`mtimecmp` device.
//! - [`registers`] holds the integer and floating-point register files.
//! - [`core`] is the interpreter proper: CSR file, executor, MMU, and the
//!   software floating-point engine.
//! - [`hart`] is the outer runtime: the step/run/pause loop, breakpoints,
//!   ECALL dispatch, and the instructions-per-second meter.
//!
//! Debugger UI panels, program loaders, and snapshot persistence are
//! external collaborators; they drive the inspector surface exposed by
//! [`hart::Hart`] and [`memory::Memory`] but live outside this crate.

#[macro_use]
extern crate static_assertions;

use std::fmt;

pub mod core;
pub mod hart;
pub mod instruction;
pub mod memory;
pub mod registers;
pub mod timer;

/// List of defined privilege levels for RISC-V.
///
/// A privilege level is encoded in two bits, but only levels `0`, `1`, and
/// `3` are defined; level `2` is reserved by the base ISA.
///
/// > The machine level has the highest privileges and is the only mandatory
/// > privilege level for a RISC-V hardware platform. Code run in
/// > machine-mode (M-mode) is usually inherently trusted, as it has
/// > low-level access to the machine implementation. User-mode (U-mode) and
/// > supervisor-mode (S-mode) are intended for conventional application and
/// > operating system usage respectively.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub enum PrivilegeLevel {
    /// User/application (abbreviated `U`) is the lowest privilege level.
    User = 0,
    /// Supervisor (abbreviated `S`) is an intermediate privilege level
    /// intended for operating systems.
    Supervisor = 1,
    // Level 2 is reserved
    /// Machine (abbreviated `M`) is the highest privilege level.
    Machine = 3,
}

impl fmt::Display for PrivilegeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match *self {
            PrivilegeLevel::User => "U",
            PrivilegeLevel::Supervisor => "S",
            PrivilegeLevel::Machine => "M",
        })
    }
}
