//! The composite stream: an ordered list of leaf and composite children that
//! reads, writes and seeks as one continuous bit stream.
//!
//! A composite keeps a single absolute cursor. Each operation translates that
//! cursor into a child and an offset inside it by walking the cumulative child
//! lengths, parks the child's own cursor there for the transfer and puts it
//! back afterwards. Children therefore never observe the composite's
//! traffic through their own position.
//!
//! The composite's length is always the sum of its children's lengths; nothing
//! is cached that could drift when a child changes.

use crate::addressing::low_mask;
use crate::error::{Result, StreamError};
use crate::leaf::LeafStream;
use crate::stream::{BitwiseStream, Stream};

#[derive(Clone, Debug, Default)]
pub struct CompositeStream {
    name: Option<String>,
    children: Vec<Stream>,
    position_bits: u64,
    read_only: bool,
}

impl CompositeStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Slices of a composite are read-only views.
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Stream> {
        self.children.iter()
    }

    pub fn get(&self, index: usize) -> Option<&Stream> {
        self.children.get(index)
    }

    /// Mutable access to a child. Read-only composites hand out none.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut Stream> {
        if self.read_only {
            return None;
        }
        self.children.get_mut(index)
    }

    /// First descendant named `name`, searching depth first.
    pub fn find(&self, name: &str) -> Option<&Stream> {
        for child in &self.children {
            if child.name() == Some(name) {
                return Some(child);
            }
            if let Stream::Composite(list) = child {
                if let Some(found) = list.find(name) {
                    return Some(found);
                }
            }
        }
        None
    }

    /// Appends a child. The cursor keeps its absolute bit offset, so a cursor
    /// that sat at the old end now sits where the new child begins.
    pub fn add(&mut self, child: impl Into<Stream>) -> Result<()> {
        self.ensure_writable()?;
        self.children.push(child.into());
        Ok(())
    }

    pub fn insert(&mut self, index: usize, child: impl Into<Stream>) -> Result<()> {
        self.ensure_writable()?;
        if index > self.children.len() {
            return Err(out_of_range());
        }
        self.children.insert(index, child.into());
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> Result<Stream> {
        self.ensure_writable()?;
        if index >= self.children.len() {
            return Err(out_of_range());
        }
        Ok(self.children.remove(index))
    }

    /// Swaps the child at `index` for `child` and returns the old one.
    pub fn replace(&mut self, index: usize, child: impl Into<Stream>) -> Result<Stream> {
        self.ensure_writable()?;
        let slot = self.children.get_mut(index).ok_or_else(out_of_range)?;
        Ok(std::mem::replace(slot, child.into()))
    }

    pub fn clear(&mut self) -> Result<()> {
        self.ensure_writable()?;
        self.children.clear();
        Ok(())
    }

    /// Bit offset at which the first stream named `name` begins. The composite
    /// itself is checked first, then its children depth first.
    pub fn position_of(&self, name: &str) -> Option<u64> {
        if self.name() == Some(name) {
            return Some(0);
        }
        let mut offset = 0;
        for child in &self.children {
            if let Some(at) = child.position_of(name) {
                return Some(offset + at);
            }
            offset += child.length_bits();
        }
        None
    }

    /// Name of the leaf covering bit `bit`.
    pub fn name_at(&self, bit: u64) -> Option<&str> {
        let mut offset = 0;
        for child in &self.children {
            let end = offset + child.length_bits();
            if bit < end {
                return child.name_at(bit - offset);
            }
            offset = end;
        }
        None
    }

    pub(crate) fn place(&mut self, bits: u64) {
        self.position_bits = bits;
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.read_only {
            return Err(StreamError::ReadOnly);
        }
        Ok(())
    }

    /// Fails if any nested composite overlapping `bits` bits from absolute bit
    /// `at` is read-only. Checked up front so a rejected write changes nothing.
    fn check_span_writable(&self, at: u64, bits: u64) -> Result<()> {
        let stop = at + bits;
        let mut start = 0u64;
        for child in &self.children {
            if start >= stop {
                break;
            }
            let end = start + child.length_bits();
            if let Stream::Composite(list) = child {
                let from = at.max(start);
                let to = stop.min(end);
                if from < to {
                    list.ensure_writable()?;
                    list.check_span_writable(from - start, to - from)?;
                }
            }
            start = end;
        }
        Ok(())
    }

    /// Reads up to `count` bits starting at absolute bit `at`, crossing child
    /// boundaries as needed. Stops early if a child comes up short.
    fn peek_bits(&mut self, at: u64, count: usize) -> Result<(u64, usize)> {
        let mut value = 0u64;
        let mut got = 0usize;
        let mut start = 0u64;
        for child in &mut self.children {
            if got == count {
                break;
            }
            let end = start + child.length_bits();
            let cursor = at + got as u64;
            if cursor < end {
                let want = ((count - got) as u64).min(end - cursor) as usize;
                let (bits, n) = read_child_at(child, cursor - start, want)?;
                value = value.checked_shl(n as u32).unwrap_or(0) | bits;
                got += n;
                if n < want {
                    break;
                }
            }
            start = end;
        }
        Ok((value, got))
    }

    /// Overwrites `count` bits at absolute bit `at`. Whatever lies past the
    /// current end goes to the tail leaf.
    fn poke_bits(&mut self, at: u64, value: u64, count: usize) -> Result<()> {
        let mut done = 0usize;
        let mut start = 0u64;
        for child in &mut self.children {
            if done == count {
                break;
            }
            let end = start + child.length_bits();
            let cursor = at + done as u64;
            if cursor < end {
                let n = ((count - done) as u64).min(end - cursor) as usize;
                let part = (value >> (count - done - n)) & low_mask(n);
                write_child_at(child, cursor - start, part, n)?;
                done += n;
            }
            start = end;
        }
        if done < count {
            let rest = count - done;
            self.append_bits(at + done as u64, value & low_mask(rest), rest)?;
        }
        Ok(())
    }

    /// Writes at or past the end through the trailing leaf, creating an
    /// anonymous one when the tail is a composite or the list is empty.
    fn append_bits(&mut self, at: u64, value: u64, count: usize) -> Result<()> {
        let mut tail = self.take_tail();
        let tail_start = self.length_bits();
        let saved = tail.position_bits();
        tail.place(at - tail_start);
        let written = tail.write_bits(value, count);
        tail.place(saved.min(tail.length_bits()));
        self.children.push(tail.into());
        written
    }

    fn take_tail(&mut self) -> LeafStream {
        match self.children.pop() {
            Some(Stream::Leaf(leaf)) => leaf,
            Some(other) => {
                self.children.push(other);
                LeafStream::new()
            }
            None => LeafStream::new(),
        }
    }

    /// Collects slices covering `bits` bits from absolute bit `start`. Fully
    /// covered composite children stay nested; partially covered ones
    /// contribute their pieces directly. Empty pieces are dropped.
    fn slice_range(&self, start: u64, bits: u64, out: &mut Vec<Stream>) -> Result<()> {
        let stop = start + bits;
        let mut at = 0u64;
        for child in &self.children {
            let len = child.length_bits();
            let end = at + len;
            let from = start.max(at);
            let to = stop.min(end);
            if from < to {
                let local = from - at;
                let n = to - from;
                match child {
                    Stream::Leaf(leaf) => out.push(leaf.slice_at(local, n)?.into()),
                    Stream::Composite(list) if local == 0 && n == len => {
                        out.push(list.detached()?.into())
                    }
                    Stream::Composite(list) => list.slice_range(local, n, out)?,
                }
            }
            if end >= stop {
                break;
            }
            at = end;
        }
        Ok(())
    }

    /// An anonymous read-only copy of the whole composite, nested shape kept.
    fn detached(&self) -> Result<CompositeStream> {
        let mut children = Vec::new();
        self.slice_range(0, self.length_bits(), &mut children)?;
        Ok(CompositeStream {
            name: None,
            children,
            position_bits: 0,
            read_only: true,
        })
    }
}

fn out_of_range() -> StreamError {
    StreamError::InvalidArgument {
        name: "index",
        reason: "index is out of range",
    }
}

fn read_child_at(child: &mut Stream, local: u64, count: usize) -> Result<(u64, usize)> {
    let saved = child.position_bits();
    child.place(local);
    let read = child.read_bits(count);
    child.place(saved);
    read
}

fn write_child_at(child: &mut Stream, local: u64, value: u64, count: usize) -> Result<()> {
    let saved = child.position_bits();
    child.place(local);
    let written = child.write_bits(value, count);
    child.place(saved);
    written
}

impl From<Vec<Stream>> for CompositeStream {
    fn from(children: Vec<Stream>) -> Self {
        Self {
            children,
            ..Self::default()
        }
    }
}

impl<'a> IntoIterator for &'a CompositeStream {
    type Item = &'a Stream;
    type IntoIter = std::slice::Iter<'a, Stream>;

    fn into_iter(self) -> Self::IntoIter {
        self.children.iter()
    }
}

impl BitwiseStream for CompositeStream {
    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn set_name(&mut self, name: Option<String>) {
        self.name = name;
    }

    fn length_bits(&self) -> u64 {
        self.children.iter().map(Stream::length_bits).sum()
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

    /// Truncation shortens the child holding the cut and drops everything
    /// after it; extension grows the tail leaf with zero bits.
    fn set_length_bits(&mut self, bits: u64) -> Result<()> {
        self.ensure_writable()?;
        let length = self.length_bits();
        if bits > length {
            let mut tail = self.take_tail();
            let grown = tail.set_length_bits(tail.length_bits() + (bits - length));
            self.children.push(tail.into());
            grown?;
        } else {
            let mut start = 0u64;
            let mut keep = 0usize;
            for child in &mut self.children {
                if start >= bits {
                    break;
                }
                let len = child.length_bits();
                if start + len > bits {
                    child.set_length_bits(bits - start)?;
                }
                start += len;
                keep += 1;
            }
            self.children.truncate(keep);
        }
        self.position_bits = self.position_bits.min(bits);
        Ok(())
    }

    fn read_bits(&mut self, count: usize) -> Result<(u64, usize)> {
        if count > 64 {
            return Err(StreamError::BitCount(count));
        }
        let available = self.length_bits().saturating_sub(self.position_bits);
        let count = (count as u64).min(available) as usize;
        if count == 0 {
            return Ok((0, 0));
        }
        let (value, got) = self.peek_bits(self.position_bits, count)?;
        self.position_bits += got as u64;
        Ok((value, got))
    }

    fn write_bits(&mut self, value: u64, count: usize) -> Result<()> {
        self.ensure_writable()?;
        if count > 64 {
            return Err(StreamError::BitCount(count));
        }
        if count == 0 {
            return Ok(());
        }
        self.check_span_writable(self.position_bits, count as u64)?;
        self.poke_bits(self.position_bits, value, count)?;
        self.position_bits += count as u64;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let available = self.length_bits().saturating_sub(self.position_bits) / 8;
        let count = (buf.len() as u64).min(available) as usize;
        let mut at = self.position_bits;
        for chunk in buf[..count].chunks_mut(8) {
            let (value, got) = self.peek_bits(at, chunk.len() * 8)?;
            for (i, byte) in chunk.iter_mut().enumerate() {
                *byte = (value >> (got - 8 * (i + 1))) as u8;
            }
            at += got as u64;
        }
        self.position_bits += count as u64 * 8;
        Ok(count)
    }

    fn write(&mut self, buf: &[u8]) -> Result<()> {
        self.ensure_writable()?;
        self.check_span_writable(self.position_bits, buf.len() as u64 * 8)?;
        for chunk in buf.chunks(8) {
            let value = chunk.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b));
            self.write_bits(value, chunk.len() * 8)?;
        }
        Ok(())
    }

    fn slice_bits(&mut self, length: u64) -> Result<Stream> {
        let available = self.length_bits().saturating_sub(self.position_bits);
        if length > available {
            return Err(StreamError::SliceOutOfRange {
                requested: length,
                available,
            });
        }
        let mut children = Vec::new();
        self.slice_range(self.position_bits, length, &mut children)?;
        log::debug!(
            "sliced {length} bits at bit {} into {} children",
            self.position_bits,
            children.len()
        );
        self.position_bits += length;
        Ok(Stream::Composite(CompositeStream {
            name: None,
            children,
            position_bits: 0,
            read_only: true,
        }))
    }
}
