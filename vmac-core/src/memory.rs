//! The physical memory fabric shared by all harts.
//!
//! A [`Memory`] is a 32-bit physical address space composed of
//! non-overlapping mapped regions. Anything that is not covered by a region
//! is vacant; accessing it is an access fault. On top of plain byte/half/
//! word access the fabric provides the word-granular primitives the A
//! extension needs: load-reserved/store-conditional reservations and the
//! nine atomic read-modify-write operations.
//!
//! The fabric is shared: harts hold it behind an [`Arc`] and the inspector
//! may peek at any time. Atomic sequences (RMW and LR/SC) are serialized by
//! a single fabric-level lock, which also guards the reservation table, so
//! they are indivisible with respect to each other. Plain accesses carry no
//! cross-hart ordering guarantees.

use log::trace;
use rangemap::RangeInclusiveMap;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, Mutex, RwLock};
use thiserror::Error;

/// A resource mappable into the physical address space: a RAM span or a
/// memory-mapped device.
///
/// Addresses passed to a region are region-relative byte offsets; the
/// fabric guarantees `offset + buf.len()` stays within [`len`](Self::len).
/// Values are serialized in little-endian byte order. Reads must be free of
/// side effects (the debugger peeks through the same path the core reads
/// through).
pub trait MemoryRegion: Debug + Send + Sync {
    /// Number of addressable bytes in this region.
    fn len(&self) -> u64;

    /// Host bytes actually allocated to back this region.
    fn used_bytes(&self) -> u64;

    /// Reads `buf.len()` bytes starting at `offset`.
    fn read(&self, buf: &mut [u8], offset: u32);

    /// Writes `buf.len()` bytes starting at `offset`.
    fn write(&self, offset: u32, buf: &[u8]);
}

/// The composed physical address space.
#[derive(Debug, Default)]
pub struct Memory {
    /// Map of physical address range to index in `regions`. Protected by a
    /// read-write lock: the table is populated during machine construction
    /// and only read afterwards.
    map: RwLock<RegionTable>,
    /// Per-hart reserved word addresses, and the serialization point for
    /// all atomic sequences.
    reservations: Mutex<HashMap<u32, u32>>,
}

#[derive(Debug, Default)]
struct RegionTable {
    ranges: RangeInclusiveMap<u32, usize>,
    regions: Vec<(u32, Arc<dyn MemoryRegion>)>,
}

impl RegionTable {
    /// Looks up the region containing `address` and checks the whole
    /// `size`-byte access stays inside its mapped range.
    fn resolve(&self, address: u32, size: u32) -> Result<(&dyn MemoryRegion, u32), MemoryError> {
        let (range, &index) = self
            .ranges
            .get_key_value(&address)
            .ok_or(MemoryError::AccessFault { address })?;
        if size != 0 && size - 1 > range.end() - address {
            // The access runs off the end of the region into a gap (or a
            // neighbouring region); both count as an access fault.
            return Err(MemoryError::AccessFault { address });
        }
        let (base, ref region) = self.regions[index];
        Ok((region.as_ref(), address - base))
    }
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches `region` at physical address `base`.
    ///
    /// Fails if the region is empty, does not fit in the 32-bit address
    /// space at `base`, or overlaps a previously attached region.
    pub fn attach_region(
        &self,
        base: u32,
        region: Arc<dyn MemoryRegion>,
    ) -> Result<(), RegionMapError> {
        let len = region.len();
        if len == 0 {
            return Err(RegionMapError::EmptyRegion);
        }
        let end = u64::from(base) + (len - 1);
        let end = u32::try_from(end).map_err(|_| RegionMapError::OutOfAddressSpace)?;
        let mut table = self.map.write().unwrap();
        if table.ranges.overlaps(&(base..=end)) {
            return Err(RegionMapError::OverlappingRegions);
        }
        trace!("mapping region of {len} bytes at {base:#010x}..={end:#010x}");
        let index = table.regions.len();
        table.regions.push((base, region));
        table.ranges.insert(base..=end, index);
        Ok(())
    }

    /// Sum of the capacities of all attached regions.
    pub fn total_bytes(&self) -> u64 {
        let table = self.map.read().unwrap();
        table.regions.iter().map(|(_, r)| r.len()).sum()
    }

    /// Host bytes actually allocated across all regions (sparse regions
    /// count only their populated parts).
    pub fn used_bytes(&self) -> u64 {
        let table = self.map.read().unwrap();
        table.regions.iter().map(|(_, r)| r.used_bytes()).sum()
    }

    pub fn read_byte(&self, address: u32) -> Result<u8, MemoryError> {
        let mut buf = [0u8; 1];
        self.read(address, &mut buf)?;
        Ok(buf[0])
    }

    pub fn read_half(&self, address: u32) -> Result<u16, MemoryError> {
        let mut buf = [0u8; 2];
        self.read(address, &mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    pub fn read_word(&self, address: u32) -> Result<u32, MemoryError> {
        let mut buf = [0u8; 4];
        self.read(address, &mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    pub fn write_byte(&self, address: u32, value: u8) -> Result<(), MemoryError> {
        self.write(address, &[value])
    }

    pub fn write_half(&self, address: u32, value: u16) -> Result<(), MemoryError> {
        self.write(address, &value.to_le_bytes())
    }

    pub fn write_word(&self, address: u32, value: u32) -> Result<(), MemoryError> {
        self.write(address, &value.to_le_bytes())
    }

    /// Non-faulting word read: `None` when `address` is not (fully) mapped.
    ///
    /// This is the debugger's and the page walker's view of memory; it has
    /// no side effects and cannot fail.
    pub fn peek_word(&self, address: u32) -> Option<u32> {
        let table = self.map.read().unwrap();
        let (region, offset) = table.resolve(address, 4).ok()?;
        let mut buf = [0u8; 4];
        region.read(&mut buf, offset);
        Some(u32::from_le_bytes(buf))
    }

    /// Bulk snapshot of `count` consecutive words starting at `base`, for
    /// the assembly view. Each element is `None` where the word is not
    /// mapped.
    pub fn peek_words(&self, base: u32, count: u32) -> Vec<Option<u32>> {
        (0..count)
            .map(|i| self.peek_word(base.wrapping_add(i * 4)))
            .collect()
    }

    /// As [`read_word`](Self::read_word), and installs a reservation on
    /// `address` for `hart`, replacing any previous reservation it held.
    pub fn read_word_reserved(&self, address: u32, hart: u32) -> Result<u32, MemoryError> {
        let mut reservations = self.reservations.lock().unwrap();
        let value = self.read_word(address)?;
        reservations.insert(hart, address);
        Ok(value)
    }

    /// Writes `value` to `address` iff `hart` still holds a valid
    /// reservation on `address`. Returns `true` on success. The hart's
    /// reservation is consumed either way.
    pub fn write_word_conditional(
        &self,
        address: u32,
        value: u32,
        hart: u32,
    ) -> Result<bool, MemoryError> {
        let mut reservations = self.reservations.lock().unwrap();
        if reservations.remove(&hart) != Some(address) {
            return Ok(false);
        }
        self.write_locked(address, &value.to_le_bytes(), &mut reservations)?;
        Ok(true)
    }

    pub fn atomic_swap(&self, address: u32, value: u32) -> Result<u32, MemoryError> {
        self.atomic_rmw(address, |_| value)
    }

    pub fn atomic_add(&self, address: u32, value: u32) -> Result<u32, MemoryError> {
        self.atomic_rmw(address, |old| old.wrapping_add(value))
    }

    pub fn atomic_xor(&self, address: u32, value: u32) -> Result<u32, MemoryError> {
        self.atomic_rmw(address, |old| old ^ value)
    }

    pub fn atomic_and(&self, address: u32, value: u32) -> Result<u32, MemoryError> {
        self.atomic_rmw(address, |old| old & value)
    }

    pub fn atomic_or(&self, address: u32, value: u32) -> Result<u32, MemoryError> {
        self.atomic_rmw(address, |old| old | value)
    }

    pub fn atomic_min(&self, address: u32, value: u32) -> Result<u32, MemoryError> {
        self.atomic_rmw(address, |old| (old as i32).min(value as i32) as u32)
    }

    pub fn atomic_max(&self, address: u32, value: u32) -> Result<u32, MemoryError> {
        self.atomic_rmw(address, |old| (old as i32).max(value as i32) as u32)
    }

    pub fn atomic_min_u(&self, address: u32, value: u32) -> Result<u32, MemoryError> {
        self.atomic_rmw(address, |old| old.min(value))
    }

    pub fn atomic_max_u(&self, address: u32, value: u32) -> Result<u32, MemoryError> {
        self.atomic_rmw(address, |old| old.max(value))
    }

    fn read(&self, address: u32, buf: &mut [u8]) -> Result<(), MemoryError> {
        let table = self.map.read().unwrap();
        let (region, offset) = table.resolve(address, buf.len() as u32)?;
        region.read(buf, offset);
        Ok(())
    }

    fn write(&self, address: u32, buf: &[u8]) -> Result<(), MemoryError> {
        // Every write path goes through the reservation lock so that the
        // write and the invalidation it implies appear as one step to
        // concurrent SC/AMO sequences.
        let mut reservations = self.reservations.lock().unwrap();
        self.write_locked(address, buf, &mut reservations)
    }

    fn write_locked(
        &self,
        address: u32,
        buf: &[u8],
        reservations: &mut HashMap<u32, u32>,
    ) -> Result<(), MemoryError> {
        let table = self.map.read().unwrap();
        let (region, offset) = table.resolve(address, buf.len() as u32)?;
        region.write(offset, buf);
        invalidate_reservations(reservations, address, buf.len() as u32);
        Ok(())
    }

    /// Reads the old word, computes the new word, and writes it back; the
    /// whole sequence holds the reservation lock and is therefore
    /// indivisible with respect to reservations and other atomics. Returns
    /// the old value.
    fn atomic_rmw(
        &self,
        address: u32,
        op: impl FnOnce(u32) -> u32,
    ) -> Result<u32, MemoryError> {
        let mut reservations = self.reservations.lock().unwrap();
        let table = self.map.read().unwrap();
        let (region, offset) = table.resolve(address, 4)?;
        let mut buf = [0u8; 4];
        region.read(&mut buf, offset);
        let old = u32::from_le_bytes(buf);
        region.write(offset, &op(old).to_le_bytes());
        invalidate_reservations(&mut reservations, address, 4);
        Ok(old)
    }
}

/// Drops every reservation whose reserved word overlaps the written range
/// `[address, address + size)`, regardless of which hart holds it.
fn invalidate_reservations(reservations: &mut HashMap<u32, u32>, address: u32, size: u32) {
    let write_end = u64::from(address) + u64::from(size) - 1;
    reservations
        .retain(|_, &mut word| u64::from(word) + 3 < u64::from(address) || u64::from(word) > write_end);
}

/// Byte-addressable main memory with page-granular sparse backing.
///
/// Pages are allocated on first write, so [`used_bytes`](Self::used_bytes)
/// reflects what the host actually committed rather than the mapped
/// capacity. Reads from never-written pages observe zeros.
#[derive(Debug)]
pub struct Ram {
    pages: Mutex<HashMap<u32, Box<Page>>>,
    len: u64,
}

const PAGE_SIZE: u32 = 4096;

type Page = [u8; PAGE_SIZE as usize];

impl Ram {
    /// Create a new zero-initialized RAM resource that can hold `size`
    /// bytes.
    ///
    /// `size` must be at least one, and at most `1 << 32` (since it must be
    /// addressable by `u32`). If `size` does not satisfy these conditions,
    /// `None` is returned and nothing is allocated.
    pub fn new(size: u64) -> Option<Self> {
        if size == 0 || size > 1 << 32 {
            None
        } else {
            Some(Self {
                pages: Mutex::new(HashMap::new()),
                len: size,
            })
        }
    }

    /// Splits the byte range starting at `offset` of length `len` into
    /// `(page_index, in_page_offset, chunk_len)` runs.
    fn page_spans(offset: u32, len: usize) -> impl Iterator<Item = (u32, u32, usize)> {
        let mut remaining = len;
        let mut cursor = offset;
        std::iter::from_fn(move || {
            if remaining == 0 {
                return None;
            }
            let page = cursor / PAGE_SIZE;
            let in_page = cursor % PAGE_SIZE;
            let chunk = remaining.min((PAGE_SIZE - in_page) as usize);
            cursor = cursor.wrapping_add(chunk as u32);
            remaining -= chunk;
            Some((page, in_page, chunk))
        })
    }
}

impl MemoryRegion for Ram {
    fn len(&self) -> u64 {
        self.len
    }

    fn used_bytes(&self) -> u64 {
        let pages = self.pages.lock().unwrap();
        pages.len() as u64 * u64::from(PAGE_SIZE)
    }

    fn read(&self, buf: &mut [u8], offset: u32) {
        let pages = self.pages.lock().unwrap();
        let mut filled = 0;
        for (page, in_page, chunk) in Self::page_spans(offset, buf.len()) {
            let dst = &mut buf[filled..filled + chunk];
            match pages.get(&page) {
                Some(data) => {
                    dst.copy_from_slice(&data[in_page as usize..in_page as usize + chunk])
                }
                None => dst.fill(0),
            }
            filled += chunk;
        }
    }

    fn write(&self, offset: u32, buf: &[u8]) {
        let mut pages = self.pages.lock().unwrap();
        let mut taken = 0;
        for (page, in_page, chunk) in Self::page_spans(offset, buf.len()) {
            let data = pages
                .entry(page)
                .or_insert_with(|| Box::new([0; PAGE_SIZE as usize]));
            data[in_page as usize..in_page as usize + chunk]
                .copy_from_slice(&buf[taken..taken + chunk]);
            taken += chunk;
        }
    }
}

#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum MemoryError {
    /// The address (or part of the accessed range) falls in a vacant
    /// region.
    #[error("access fault at address {address:#010x}")]
    AccessFault { address: u32 },
}

#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum RegionMapError {
    /// The mapped range overlaps with a previously mapped memory region.
    #[error("memory region mapping overlaps with previously mapped memory region")]
    OverlappingRegions,
    /// Zero-sized regions cannot be mapped.
    #[error("cannot map an empty memory region")]
    EmptyRegion,
    /// The region does not fit in the 32-bit address space at the
    /// requested base.
    #[error("memory region extends past the end of the address space")]
    OutOfAddressSpace,
}
