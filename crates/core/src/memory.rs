//! Read-only access to the bytes of the image being rewritten.

use crate::addr::ConcreteAddr;
use crate::result::{Error, Result};

/// Read-only byte access over the loaded image.
///
/// Implementations report [`Error::NoByteRegion`] when an address falls
/// outside every mapped region and [`Error::Memory`] for failures below the
/// region lookup.
pub trait Memory {
    /// Reads `len` bytes starting at `addr`.
    fn read(&self, addr: ConcreteAddr, len: u64) -> Result<Vec<u8>>;
}

/// A single contiguous byte region, the common case for tests and clients
/// that rewrite one text section at a time.
#[derive(Debug, Clone)]
pub struct SliceMemory {
    base: ConcreteAddr,
    bytes: Vec<u8>,
}

impl SliceMemory {
    /// Wraps `bytes` as the region starting at `base`.
    pub fn new(base: ConcreteAddr, bytes: Vec<u8>) -> Self {
        Self { base, bytes }
    }

    /// First address of the region.
    pub fn base(&self) -> ConcreteAddr {
        self.base
    }

    /// One past the last address of the region.
    pub fn end(&self) -> Result<ConcreteAddr> {
        self.base.advance(self.bytes.len() as u64)
    }
}

impl Memory for SliceMemory {
    fn read(&self, addr: ConcreteAddr, len: u64) -> Result<Vec<u8>> {
        let offset = addr
            .distance_from(self.base)
            .map_err(|_| Error::NoByteRegion(addr))?;
        if offset < 0 {
            return Err(Error::NoByteRegion(addr));
        }
        let start = offset as u64;
        let end = start.checked_add(len).ok_or(Error::NoByteRegion(addr))?;
        if end > self.bytes.len() as u64 {
            return Err(Error::NoByteRegion(addr));
        }
        Ok(self.bytes[start as usize..end as usize].to_vec())
    }
}
