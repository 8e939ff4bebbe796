//! Shared-memory region interface.
//!
//! All accesses are bounds-checked byte transfers; there is no pointer
//! arithmetic in this crate. Coherency is a construction-time policy: a
//! region is either naturally coherent (plain copies) or wrapped in
//! [`NonCoherentSharedMemory`], which issues cache maintenance around each
//! transfer.

use core::fmt;

/// Access outside the region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutOfRange {
    pub offset: usize,
    pub len: usize,
    pub size: usize,
}

impl fmt::Display for OutOfRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "access out of range: offset {} len {} exceeds region size {}",
            self.offset, self.len, self.size
        )
    }
}

impl std::error::Error for OutOfRange {}

#[inline]
fn check_bounds(offset: usize, len: usize, size: usize) -> Result<(), OutOfRange> {
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(()),
        _ => Err(OutOfRange { offset, len, size }),
    }
}

/// Byte-addressable shared region supplied by the embedder.
pub trait SharedMemory: Send {
    /// Region size in bytes.
    fn size(&self) -> usize;

    /// Base address of the region, for diagnostics and cache maintenance.
    fn base(&self) -> usize;

    /// Copy `dst.len()` bytes starting at `offset` into `dst`.
    fn read(&self, offset: usize, dst: &mut [u8]) -> Result<(), OutOfRange>;

    /// Copy `src` into the region starting at `offset`.
    fn write(&mut self, offset: usize, src: &[u8]) -> Result<(), OutOfRange>;

    /// Set `len` bytes starting at `offset` to `byte`.
    fn fill(&mut self, offset: usize, byte: u8, len: usize) -> Result<(), OutOfRange>;
}

/// Heap-backed coherent region. The flavor used by tests and hosted
/// embedders; real deployments wrap device memory instead.
#[derive(Debug)]
pub struct HeapSharedMemory {
    buf: Vec<u8>,
}

impl HeapSharedMemory {
    /// Allocate a zeroed region of `size` bytes.
    pub fn new(size: usize) -> Self {
        Self {
            buf: vec![0u8; size],
        }
    }
}

impl SharedMemory for HeapSharedMemory {
    fn size(&self) -> usize {
        self.buf.len()
    }

    fn base(&self) -> usize {
        self.buf.as_ptr() as usize
    }

    fn read(&self, offset: usize, dst: &mut [u8]) -> Result<(), OutOfRange> {
        check_bounds(offset, dst.len(), self.buf.len())?;
        dst.copy_from_slice(&self.buf[offset..offset + dst.len()]);
        Ok(())
    }

    fn write(&mut self, offset: usize, src: &[u8]) -> Result<(), OutOfRange> {
        check_bounds(offset, src.len(), self.buf.len())?;
        self.buf[offset..offset + src.len()].copy_from_slice(src);
        Ok(())
    }

    fn fill(&mut self, offset: usize, byte: u8, len: usize) -> Result<(), OutOfRange> {
        check_bounds(offset, len, self.buf.len())?;
        self.buf[offset..offset + len].fill(byte);
        Ok(())
    }
}

/// Cache maintenance hooks for a non-coherent interconnect.
pub trait CacheOps: Send {
    /// Write dirty lines covering `[addr, addr+len)` back to memory.
    fn clean(&self, addr: usize, len: usize);

    /// Drop cached lines covering `[addr, addr+len)`.
    fn invalidate(&self, addr: usize, len: usize);
}

/// Wraps a region with cache clean/invalidate around each transfer.
///
/// Reads invalidate first so the peer's stores are observed; writes clean
/// afterwards so the peer observes ours.
pub struct NonCoherentSharedMemory<M, C> {
    inner: M,
    cache: C,
}

impl<M: SharedMemory, C: CacheOps> NonCoherentSharedMemory<M, C> {
    pub fn new(inner: M, cache: C) -> Self {
        Self { inner, cache }
    }
}

impl<M: SharedMemory, C: CacheOps> SharedMemory for NonCoherentSharedMemory<M, C> {
    fn size(&self) -> usize {
        self.inner.size()
    }

    fn base(&self) -> usize {
        self.inner.base()
    }

    fn read(&self, offset: usize, dst: &mut [u8]) -> Result<(), OutOfRange> {
        self.cache.invalidate(self.inner.base() + offset, dst.len());
        self.inner.read(offset, dst)
    }

    fn write(&mut self, offset: usize, src: &[u8]) -> Result<(), OutOfRange> {
        self.inner.write(offset, src)?;
        self.cache.clean(self.inner.base() + offset, src.len());
        Ok(())
    }

    fn fill(&mut self, offset: usize, byte: u8, len: usize) -> Result<(), OutOfRange> {
        self.inner.fill(offset, byte, len)?;
        self.cache.clean(self.inner.base() + offset, len);
        Ok(())
    }
}
