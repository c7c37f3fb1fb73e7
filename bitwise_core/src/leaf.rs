//! The leaf stream: bit-precise storage over an owned buffer or a shared window.

use crate::addressing::{bytes_needed, low_mask};
use crate::error::{Result, StreamError};
use crate::stream::{BitwiseStream, Stream};
use crate::window::{SharedResource, Window};

/// Where a leaf's bytes physically live.
#[derive(Clone, Debug)]
enum Backing {
    Owned(Vec<u8>),
    Window(Window),
}

impl Default for Backing {
    fn default() -> Self {
        Backing::Owned(Vec::new())
    }
}

impl Backing {
    fn lead_bits(&self) -> u64 {
        match self {
            Backing::Owned(_) => 0,
            Backing::Window(window) => u64::from(window.lead_bits()),
        }
    }

    fn allocated(&self) -> u64 {
        match self {
            Backing::Owned(bytes) => bytes.len() as u64,
            Backing::Window(window) => window.length(),
        }
    }

    /// Fills `buf` from physical byte `at`; unallocated bytes read as zero.
    fn read_at(&self, at: u64, buf: &mut [u8]) -> Result<()> {
        match self {
            Backing::Owned(bytes) => {
                buf.fill(0);
                let start = at as usize;
                if start < bytes.len() {
                    let n = (bytes.len() - start).min(buf.len());
                    buf[..n].copy_from_slice(&bytes[start..start + n]);
                }
                Ok(())
            }
            Backing::Window(window) => window.read_at(at, buf),
        }
    }

    fn write_at(&mut self, at: u64, data: &[u8]) -> Result<()> {
        match self {
            Backing::Owned(bytes) => {
                let start = at as usize;
                let end = start + data.len();
                if bytes.len() < end {
                    bytes.resize(end, 0);
                }
                bytes[start..end].copy_from_slice(data);
                Ok(())
            }
            Backing::Window(window) => window.write_at(at, data),
        }
    }

    /// Truncation keeps the leading bytes untouched, including any stale bits
    /// in a partially used trailing byte.
    fn resize(&mut self, allocated: u64) -> Result<()> {
        match self {
            Backing::Owned(bytes) => {
                bytes.resize(allocated as usize, 0);
                Ok(())
            }
            Backing::Window(window) => window.set_length(allocated),
        }
    }
}

/// A single unit of bit-addressable storage.
///
/// Bits are numbered most significant first: bit 0 is the high bit of the
/// first byte. The cursor may sit anywhere at or past bit 0, including past
/// the end of the content; writes there grow the stream and zero-fill the gap.
#[derive(Clone, Debug, Default)]
pub struct LeafStream {
    name: Option<String>,
    backing: Backing,
    length_bits: u64,
    position_bits: u64,
}

impl LeafStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// An owned leaf holding exactly `bytes`.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        let bytes = bytes.into();
        let length_bits = bytes.len() as u64 * 8;
        Self {
            name: None,
            backing: Backing::Owned(bytes),
            length_bits,
            position_bits: 0,
        }
    }

    /// A leaf reading and writing through `window`, sized to the whole window.
    pub fn from_window(window: Window) -> Self {
        let length_bits = (window.length() * 8).saturating_sub(u64::from(window.lead_bits()));
        Self {
            name: None,
            backing: Backing::Window(window),
            length_bits,
            position_bits: 0,
        }
    }

    /// A leaf over the entire content of a shared resource, such as a sample
    /// file. No bytes are copied.
    pub fn from_resource(resource: SharedResource) -> Result<Self> {
        Ok(Self::from_window(Window::over(resource)?))
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// The window this leaf reads through, if it does not own its bytes.
    pub fn window(&self) -> Option<&Window> {
        match &self.backing {
            Backing::Owned(_) => None,
            Backing::Window(window) => Some(window),
        }
    }

    /// Bytes of storage reserved for the content: `ceil(length_bits / 8)` for
    /// owned leaves.
    pub fn allocated_bytes(&self) -> u64 {
        self.backing.allocated()
    }

    pub(crate) fn place(&mut self, bits: u64) {
        self.position_bits = bits;
    }

    /// A new anonymous leaf covering `bits` bits starting at bit `at`. Window
    /// backed leaves share their resource; owned leaves copy.
    pub(crate) fn slice_at(&self, at: u64, bits: u64) -> Result<LeafStream> {
        match &self.backing {
            Backing::Window(window) => {
                log::debug!(
                    "slicing {bits} bits at bit {at} through window at offset {}",
                    window.offset()
                );
                Ok(LeafStream {
                    name: None,
                    backing: Backing::Window(window.narrow(at, bits)),
                    length_bits: bits,
                    position_bits: 0,
                })
            }
            Backing::Owned(_) => {
                log::debug!("slicing {bits} bits at bit {at} by copy");
                Ok(LeafStream {
                    name: None,
                    backing: Backing::Owned(self.copy_bits(at, bits)?),
                    length_bits: bits,
                    position_bits: 0,
                })
            }
        }
    }

    /// `bits` bits from bit `at`, realigned to start on a byte boundary with
    /// any trailing partial byte zero padded.
    fn copy_bits(&self, at: u64, bits: u64) -> Result<Vec<u8>> {
        let whole = (bits / 8) as usize;
        let mut bytes = vec![0u8; bytes_needed(bits) as usize];
        self.peek_bytes(at, &mut bytes[..whole])?;
        let rest = (bits % 8) as usize;
        if rest > 0 {
            let tail = self.peek_bits(at + whole as u64 * 8, rest)?;
            bytes[whole] = (tail << (8 - rest)) as u8;
        }
        Ok(bytes)
    }

    /// Prepares the backing for content reaching `end_bits`. A window whose
    /// content stops short of the end of its resource cannot grow in place
    /// without overwriting bytes other streams address, so it is detached into
    /// an owned copy first.
    fn reserve(&mut self, end_bits: u64) -> Result<()> {
        if end_bits <= self.length_bits {
            return Ok(());
        }
        let Backing::Window(window) = &self.backing else {
            return Ok(());
        };
        let content_end = window.offset() * 8 + u64::from(window.lead_bits()) + self.length_bits;
        if content_end >= window.resource_length()? * 8 {
            return Ok(());
        }
        log::debug!(
            "detaching {} bits from window at offset {} before growing",
            self.length_bits,
            window.offset()
        );
        let bytes = self.copy_bits(0, self.length_bits)?;
        self.backing = Backing::Owned(bytes);
        Ok(())
    }

    /// Locates the physical bytes holding `count` bits at logical bit `at`:
    /// (first byte, bits to skip in it, bytes spanned).
    fn span(&self, at: u64, count: usize) -> (u64, usize, usize) {
        let start = self.backing.lead_bits() + at;
        let skip = (start % 8) as usize;
        (start / 8, skip, (skip + count).div_ceil(8))
    }

    /// Reads up to 64 bits at `at` without moving the cursor or checking length.
    fn peek_bits(&self, at: u64, count: usize) -> Result<u64> {
        let (first, skip, span) = self.span(at, count);
        let mut raw = [0u8; 9];
        self.backing.read_at(first, &mut raw[..span])?;
        let acc = raw[..span]
            .iter()
            .fold(0u128, |acc, &b| (acc << 8) | u128::from(b));
        let shift = span * 8 - skip - count;
        Ok((acc >> shift) as u64 & low_mask(count))
    }

    /// Overwrites `count` bits at `at`, leaving neighbouring bits alone.
    fn poke_bits(&mut self, at: u64, value: u64, count: usize) -> Result<()> {
        let (first, skip, span) = self.span(at, count);
        let mut raw = [0u8; 9];
        self.backing.read_at(first, &mut raw[..span])?;
        let mut acc = raw[..span]
            .iter()
            .fold(0u128, |acc, &b| (acc << 8) | u128::from(b));
        let shift = span * 8 - skip - count;
        let mask = u128::from(low_mask(count)) << shift;
        acc = (acc & !mask) | (u128::from(value & low_mask(count)) << shift);
        for byte in raw[..span].iter_mut().rev() {
            *byte = acc as u8;
            acc >>= 8;
        }
        self.backing.write_at(first, &raw[..span])
    }

    /// Reads `out.len()` whole bytes starting at bit `at`, realigning if the
    /// start is not on a byte boundary.
    fn peek_bytes(&self, at: u64, out: &mut [u8]) -> Result<()> {
        if out.is_empty() {
            return Ok(());
        }
        let (first, skip, _) = self.span(at, 0);
        if skip == 0 {
            return self.backing.read_at(first, out);
        }
        let mut raw = vec![0u8; out.len() + 1];
        self.backing.read_at(first, &mut raw)?;
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = (raw[i] << skip) | (raw[i + 1] >> (8 - skip));
        }
        Ok(())
    }

    fn advance(&mut self, bits: u64) {
        self.position_bits += bits;
        self.length_bits = self.length_bits.max(self.position_bits);
    }
}

impl From<Vec<u8>> for LeafStream {
    fn from(bytes: Vec<u8>) -> Self {
        LeafStream::from_bytes(bytes)
    }
}

impl From<&[u8]> for LeafStream {
    fn from(bytes: &[u8]) -> Self {
        LeafStream::from_bytes(bytes.to_vec())
    }
}

impl BitwiseStream for LeafStream {
    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn set_name(&mut self, name: Option<String>) {
        self.name = name;
    }

    fn length_bits(&self) -> u64 {
        self.length_bits
    }

    fn position_bits(&self) -> u64 {
        self.position_bits
    }

    fn set_position_bits(&mut self, bits: i64) -> Result<()> {
        if bits < 0 {
            return Err(StreamError::negative("position_bits"));
        }
        self.position_bits = bits as u64;
        Ok(())
    }

    fn set_length_bits(&mut self, bits: u64) -> Result<()> {
        self.reserve(bits)?;
        self.backing
            .resize(bytes_needed(self.backing.lead_bits() + bits))?;
        self.length_bits = bits;
        self.position_bits = self.position_bits.min(bits);
        Ok(())
    }

    fn read_bits(&mut self, count: usize) -> Result<(u64, usize)> {
        if count > 64 {
            return Err(StreamError::BitCount(count));
        }
        let available = self.length_bits.saturating_sub(self.position_bits);
        let count = (count as u64).min(available) as usize;
        if count == 0 {
            return Ok((0, 0));
        }
        let value = self.peek_bits(self.position_bits, count)?;
        self.position_bits += count as u64;
        Ok((value, count))
    }

    fn write_bits(&mut self, value: u64, count: usize) -> Result<()> {
        if count > 64 {
            return Err(StreamError::BitCount(count));
        }
        if count == 0 {
            return Ok(());
        }
        self.reserve(self.position_bits + count as u64)?;
        self.poke_bits(self.position_bits, value, count)?;
        self.advance(count as u64);
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let available = self.length_bits.saturating_sub(self.position_bits) / 8;
        let count = (buf.len() as u64).min(available) as usize;
        if count == 0 {
            return Ok(0);
        }
        self.peek_bytes(self.position_bits, &mut buf[..count])?;
        self.position_bits += count as u64 * 8;
        Ok(count)
    }

    fn write(&mut self, buf: &[u8]) -> Result<()> {
        if buf.is_empty() {
            return Ok(());
        }
        self.reserve(self.position_bits + buf.len() as u64 * 8)?;
        let (first, skip, _) = self.span(self.position_bits, 0);
        if skip == 0 {
            self.backing.write_at(first, buf)?;
        } else {
            let mut at = self.position_bits;
            for chunk in buf.chunks(8) {
                let value = chunk.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b));
                self.poke_bits(at, value, chunk.len() * 8)?;
                at += chunk.len() as u64 * 8;
            }
        }
        self.advance(buf.len() as u64 * 8);
        Ok(())
    }

    fn slice_bits(&mut self, length: u64) -> Result<Stream> {
        let available = self.length_bits.saturating_sub(self.position_bits);
        if length > available {
            return Err(StreamError::SliceOutOfRange {
                requested: length,
                available,
            });
        }
        let slice = self.slice_at(self.position_bits, length)?;
        self.position_bits += length;
        Ok(Stream::Leaf(slice))
    }
}
