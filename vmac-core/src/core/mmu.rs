//! Sv32-style virtual-to-physical address translation.
//!
//! A virtual address is `{vpn1:10, vpn0:10, offset:12}` and `satp << 12` is
//! the physical address of the root page table. Page table entries are read
//! through [`Memory::peek_word`] so a walk can never disturb machine state.
//!
//! The walk validates the V bit, the reserved R/W combination, superpage
//! alignment, and the A/D bits, but does not yet hold the leaf's R/W/X/U
//! bits against the access type and privilege level: the access check used
//! by the fetch path reports every permission as granted. The
//! [`PageTableEntry`] accessors expose the bits for when that check is
//! tightened.

use crate::memory::Memory;
use thiserror::Error;

const PAGE_SIZE: u32 = 0x1000;

/// One Sv32 page table entry.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PageTableEntry(u32);

impl PageTableEntry {
    pub fn valid(self) -> bool {
        self.0 & 1 != 0
    }

    pub fn readable(self) -> bool {
        self.0 & (1 << 1) != 0
    }

    pub fn writable(self) -> bool {
        self.0 & (1 << 2) != 0
    }

    pub fn executable(self) -> bool {
        self.0 & (1 << 3) != 0
    }

    pub fn user(self) -> bool {
        self.0 & (1 << 4) != 0
    }

    pub fn accessed(self) -> bool {
        self.0 & (1 << 6) != 0
    }

    pub fn dirty(self) -> bool {
        self.0 & (1 << 7) != 0
    }

    /// An entry with any of R/W/X set maps a page; otherwise it points at
    /// the next-level table.
    pub fn is_leaf(self) -> bool {
        self.0 & 0b1110 != 0
    }

    /// The full 22-bit physical page number.
    pub fn ppn(self) -> u32 {
        self.0 >> 10
    }

    /// The low 10 bits of the PPN. Must be zero in a superpage leaf.
    pub fn ppn0(self) -> u32 {
        (self.0 >> 10) & 0x3FF
    }

    /// The high 12 bits of the PPN.
    pub fn ppn1(self) -> u32 {
        self.0 >> 20
    }
}

/// Outcome of the access check on the instruction-fetch path.
///
/// The check currently grants every permission and maps addresses
/// one-to-one; the structure exists so the fetch path already consumes the
/// shape a real check would produce.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct MemoryAccess {
    pub readable: bool,
    pub writable: bool,
    pub executable: bool,
    /// Whether the address is backed at all (a missing page would clear
    /// this).
    pub present: bool,
    pub physical_address: u32,
}

/// Address-translation view over the shared memory fabric.
#[derive(Debug, Copy, Clone)]
pub struct Mmu<'a> {
    memory: &'a Memory,
}

impl<'a> Mmu<'a> {
    pub fn new(memory: &'a Memory) -> Self {
        Self { memory }
    }

    /// Access check used when fetching instructions: identity translation
    /// with all permissions granted.
    pub fn check_access(&self, address: u32) -> MemoryAccess {
        MemoryAccess {
            readable: true,
            writable: true,
            executable: true,
            present: true,
            physical_address: address,
        }
    }

    /// Walks the two-level page table rooted at `satp << 12` and returns
    /// the physical address for `virtual_address`.
    pub fn translate(
        &self,
        satp: u32,
        virtual_address: u32,
        is_write: bool,
    ) -> Result<u32, TranslationError> {
        let offset = virtual_address & 0xFFF;
        let vpn0 = (virtual_address >> 12) & 0x3FF;
        let vpn1 = virtual_address >> 22;
        let root = satp << 12;

        let pte1 = self.read_entry(root.wrapping_add(vpn1 * 4), virtual_address)?;

        let (leaf, superpage) = if pte1.is_leaf() {
            (pte1, true)
        } else {
            let next = pte1.ppn().wrapping_mul(PAGE_SIZE).wrapping_add(vpn0 * 4);
            let pte0 = self.read_entry(next, virtual_address)?;
            if !pte0.is_leaf() {
                // A second-level pointer entry would make the walk deeper
                // than Sv32 allows.
                return Err(TranslationError::PageFault {
                    address: virtual_address,
                });
            }
            (pte0, false)
        };

        // A 4 MiB superpage must be naturally aligned.
        if superpage && leaf.ppn0() != 0 {
            return Err(TranslationError::PageFault {
                address: virtual_address,
            });
        }

        if !leaf.accessed() || (is_write && !leaf.dirty()) {
            return Err(TranslationError::PageFault {
                address: virtual_address,
            });
        }

        Ok(if superpage {
            leaf.ppn1() << 22 | vpn0 << 12 | offset
        } else {
            leaf.ppn() << 12 | offset
        })
    }

    /// Reads and validates one page table entry.
    fn read_entry(
        &self,
        entry_address: u32,
        virtual_address: u32,
    ) -> Result<PageTableEntry, TranslationError> {
        let raw = self
            .memory
            .peek_word(entry_address)
            .ok_or(TranslationError::AccessFault {
                address: entry_address,
            })?;
        let entry = PageTableEntry(raw);
        // W without R is reserved.
        if !entry.valid() || (!entry.readable() && entry.writable()) {
            return Err(TranslationError::PageFault {
                address: virtual_address,
            });
        }
        Ok(entry)
    }
}

#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum TranslationError {
    /// A page table entry could not be read because its address is not
    /// mapped.
    #[error("translation failed: page table entry at {address:#010x} is not mapped")]
    AccessFault { address: u32 },
    /// The walk found no valid, properly-formed leaf for the address.
    #[error("translation failed: page fault for address {address:#010x}")]
    PageFault { address: u32 },
}
