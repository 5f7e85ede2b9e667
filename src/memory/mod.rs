//! Sysex-addressable parameter memory.
//!
//! The real machine exposes a flat address space split into typed
//! regions (system, patches, timbres, rhythm, part/timbre temporaries,
//! display). Each region here is a plain byte-backed struct array with a
//! `(base address, length)` and a `write`/`read` pair; Sysex Data-Set-1
//! mutates a region's bytes directly and then calls the region's dirty
//! hook so cached derived values (e.g. decoded envelope parameters) stay
//! in sync, per `spec.md` §3's "per-region dirty hooks" requirement.

mod patch;
mod rhythm;
mod system;
mod timbre;

pub use patch::PatchParams;
pub use rhythm::{RhythmKeyParams, RhythmParams};
pub use system::SystemParams;
pub use timbre::{PartialParams, PartialStructure, TimbreParams};

use crate::{MT32Error, Result};

/// Number of melodic parts (8) plus the rhythm part (1).
pub const NUM_PARTS: usize = 9;
/// Index of the rhythm part within part-indexed arrays.
pub const RHYTHM_PART_INDEX: usize = 8;
/// Number of patch memory slots.
pub const NUM_PATCHES: usize = 128;
/// Number of timbre memory slots.
pub const NUM_TIMBRES: usize = 64;
/// Number of rhythm key-map entries.
pub const NUM_RHYTHM_KEYS: usize = 85;

/// Base absolute addresses for each region, in the machine's 7-bit-byte
/// Sysex address space (each byte contributes 7 bits, matching the
/// documented DT1/RQ1 addressing convention).
pub mod base_address {
    /// System region base address.
    pub const SYSTEM: u32 = 0x10_0000;
    /// Patch Temporary[9] base address.
    pub const PATCH_TEMP: u32 = 0x03_0000;
    /// Rhythm Temporary[85] base address.
    pub const RHYTHM_TEMP: u32 = 0x03_0110;
    /// Timbre Temporary[8] base address.
    pub const TIMBRE_TEMP: u32 = 0x00_0000;
    /// Patches[128] base address.
    pub const PATCHES: u32 = 0x05_0000;
    /// Timbres[64] base address.
    pub const TIMBRES: u32 = 0x08_0000;
    /// Display region base address.
    pub const DISPLAY: u32 = 0x20_0000;
    /// Reset pseudo-region address (a write here triggers a full reset).
    pub const RESET: u32 = 0x7F_0000;
}

/// One addressable memory region: an offset range plus raw byte storage.
#[derive(Clone, Debug)]
pub struct MemoryRegion {
    base: u32,
    bytes: Vec<u8>,
}

impl MemoryRegion {
    /// Creates a region of `len` zeroed bytes starting at `base`.
    pub fn new(base: u32, len: usize) -> Self {
        MemoryRegion {
            base,
            bytes: vec![0; len],
        }
    }

    /// Absolute base address.
    pub fn base(&self) -> u32 {
        self.base
    }

    /// Region length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// `true` if the region holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// `true` if `[address, address+length)` falls entirely inside this
    /// region.
    pub fn contains(&self, address: u32, length: usize) -> bool {
        address >= self.base
            && (address - self.base) as usize + length <= self.bytes.len()
    }

    /// Writes `data` at `address`. Caller must have checked
    /// [`MemoryRegion::contains`] first.
    pub fn write(&mut self, address: u32, data: &[u8]) {
        let offset = (address - self.base) as usize;
        self.bytes[offset..offset + data.len()].copy_from_slice(data);
    }

    /// Reads `length` bytes at `address`, or zero-filled bytes with a
    /// `false` second return value if out of range (per §7's "out-of-range
    /// memory reads return zero-filled bytes").
    pub fn read(&self, address: u32, length: usize) -> (Vec<u8>, bool) {
        if self.contains(address, length) {
            let offset = (address - self.base) as usize;
            (self.bytes[offset..offset + length].to_vec(), true)
        } else {
            (vec![0; length], false)
        }
    }

    /// Raw byte slice, for regions read wholesale by their typed view.
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// Raw mutable byte slice.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

/// Dispatches a DT1 write to whichever region claims `address`, returning
/// [`MT32Error::SysexAddressOutOfRange`] if none does.
pub fn write_region(
    regions: &mut [(&mut MemoryRegion, fn(&mut MemoryRegion))],
    address: u32,
    data: &[u8],
) -> Result<()> {
    for (region, on_dirty) in regions.iter_mut() {
        if region.contains(address, data.len()) {
            region.write(address, data);
            on_dirty(region);
            return Ok(());
        }
    }
    Err(MT32Error::SysexAddressOutOfRange {
        address,
        length: data.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips() {
        let mut region = MemoryRegion::new(0x1000, 16);
        region.write(0x1004, &[1, 2, 3]);
        let (data, ok) = region.read(0x1004, 3);
        assert!(ok);
        assert_eq!(data, vec![1, 2, 3]);
    }

    #[test]
    fn out_of_range_read_is_zero_filled() {
        let region = MemoryRegion::new(0x1000, 16);
        let (data, ok) = region.read(0x2000, 4);
        assert!(!ok);
        assert_eq!(data, vec![0, 0, 0, 0]);
    }

    #[test]
    fn contains_rejects_partial_overlap_past_end() {
        let region = MemoryRegion::new(0x1000, 4);
        assert!(!region.contains(0x1002, 4));
        assert!(region.contains(0x1000, 4));
    }
}
