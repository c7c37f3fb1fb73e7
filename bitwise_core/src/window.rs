//! Shared physical resources and the windows that address them.
//!
//! A [`Window`] is a `(resource, offset, length)` triple over a reference
//! counted resource. Many windows may point into the same resource, each owned
//! by an independent stream with its own cursor. The resource itself has a
//! single absolute position, so every transfer through a window seeks the
//! resource to `offset + local` as its first step.
//!
//! The contract is one active reader or writer per physical resource at a time.
//! Windows are `!Send`; interleaving windows over one resource from several
//! threads is not supported.

use crate::error::{Result, StreamError};
use std::cell::{RefCell, RefMut};
use std::fmt;
use std::io::{self, ErrorKind, Read, Seek, SeekFrom, Write};
use std::rc::Rc;

const ZERO_FILL_CHUNK: usize = 4096;

/// Anything a window can sit on top of: in-memory cursors, files, devices.
pub trait Resource: Read + Write + Seek {}

impl<T: Read + Write + Seek> Resource for T {}

/// Reference counted handle to a resource shared between windows.
pub type SharedResource = Rc<RefCell<dyn Resource>>;

/// Wraps a resource so that windows can share it.
pub fn share<R: Resource + 'static>(resource: R) -> SharedResource {
    Rc::new(RefCell::new(resource))
}

#[derive(Clone)]
pub struct Window {
    resource: SharedResource,
    /// Absolute byte offset of the window's first byte in the resource.
    offset: u64,
    /// Bytes addressable through the window.
    length: u64,
    /// Bits of the first byte that precede the window's first bit (0..8).
    lead_bits: u8,
}

impl Window {
    pub fn new(resource: SharedResource, offset: u64, length: u64) -> Self {
        Self {
            resource,
            offset,
            length,
            lead_bits: 0,
        }
    }

    /// A window spanning the whole resource as it is right now.
    pub fn over(resource: SharedResource) -> Result<Self> {
        let length = Self::measure(&resource)?;
        Ok(Self::new(resource, 0, length))
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn lead_bits(&self) -> u8 {
        self.lead_bits
    }

    pub fn resource(&self) -> &SharedResource {
        &self.resource
    }

    pub fn shares_resource_with(&self, other: &Window) -> bool {
        Rc::ptr_eq(&self.resource, &other.resource)
    }

    /// Current size of the whole shared resource in bytes.
    pub fn resource_length(&self) -> Result<u64> {
        Self::measure(&self.resource)
    }

    /// A window over `bits` bits starting `skip_bits` past this window's first
    /// bit. Shares the resource; nothing is copied.
    pub(crate) fn narrow(&self, skip_bits: u64, bits: u64) -> Window {
        let start = u64::from(self.lead_bits) + skip_bits;
        let lead_bits = (start % 8) as u8;
        Window {
            resource: Rc::clone(&self.resource),
            offset: self.offset + start / 8,
            length: (u64::from(lead_bits) + bits).div_ceil(8),
            lead_bits,
        }
    }

    /// Fills `buf` from local byte `local`. Bytes outside the window or past
    /// the end of the resource read as zero.
    pub(crate) fn read_at(&self, local: u64, buf: &mut [u8]) -> Result<()> {
        buf.fill(0);
        let wanted = self.length.saturating_sub(local).min(buf.len() as u64) as usize;
        if wanted == 0 {
            return Ok(());
        }

        let mut guard = Self::acquire(&self.resource)?;
        let target = self.offset + local;
        log::trace!("window read: seek resource to {target}, {wanted} bytes");
        guard.seek(SeekFrom::Start(target))?;

        let mut filled = 0;
        while filled < wanted {
            match guard.read(&mut buf[filled..wanted]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Writes `data` at local byte `local`, extending the window if the write
    /// runs past its current end.
    pub(crate) fn write_at(&mut self, local: u64, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        {
            let mut guard = Self::acquire(&self.resource)?;
            let target = self.offset + local;
            log::trace!("window write: seek resource to {target}, {} bytes", data.len());
            guard.seek(SeekFrom::Start(target))?;
            guard.write_all(data)?;
        }
        self.length = self.length.max(local + data.len() as u64);
        Ok(())
    }

    /// Shrinks the window, or extends it by writing zeros into the resource.
    pub(crate) fn set_length(&mut self, length: u64) -> Result<()> {
        if length <= self.length {
            self.length = length;
            return Ok(());
        }
        let zeros = [0u8; ZERO_FILL_CHUNK];
        let mut at = self.length;
        while at < length {
            let n = (length - at).min(ZERO_FILL_CHUNK as u64) as usize;
            self.write_at(at, &zeros[..n])?;
            at += n as u64;
        }
        Ok(())
    }

    fn measure(resource: &SharedResource) -> Result<u64> {
        let mut guard = Self::acquire(resource)?;
        let end = guard.seek(SeekFrom::End(0))?;
        guard.seek(SeekFrom::Start(0))?;
        Ok(end)
    }

    fn acquire(resource: &SharedResource) -> Result<RefMut<'_, dyn Resource + 'static>> {
        resource.try_borrow_mut().map_err(|_| {
            StreamError::Io(io::Error::new(
                ErrorKind::WouldBlock,
                "shared resource is already in use by another window",
            ))
        })
    }
}

impl fmt::Debug for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Window")
            .field("offset", &self.offset)
            .field("length", &self.length)
            .field("lead_bits", &self.lead_bits)
            .finish_non_exhaustive()
    }
}
