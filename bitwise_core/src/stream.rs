//! The [`BitwiseStream`] trait shared by leaf and composite streams, and the
//! [`Stream`] value that holds either kind.
//!
//! Positions and lengths are kept in bits. The byte-level accessors round
//! down, so a stream of 12 bits reports a length of 1 byte.

use crate::addressing::{BLOCK_COPY_SIZE, bits_to_bytes, bytes_needed};
use crate::composite::CompositeStream;
use crate::error::{Result, StreamError};
use crate::leaf::LeafStream;
use std::io;

/// Filler used when growing a stream that has no whole byte to replicate.
pub const GROW_FILLER: u8 = b'A';

/// Reference point for a seek.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    Start,
    Current,
    End,
}

/// The capability set shared by leaf and composite streams.
///
/// Every consumer of stream values (data model elements, the cracker,
/// publishers) goes through this trait and never looks at how a stream stores
/// its bits. Lengths and positions are kept in bits; the byte views are derived
/// by rounding down.
///
/// Reads never fail for lack of data. They return how many bits or bytes were
/// actually produced, which is zero once the cursor is at or past the end.
pub trait BitwiseStream {
    fn name(&self) -> Option<&str>;

    fn set_name(&mut self, name: Option<String>);

    fn length_bits(&self) -> u64;

    fn position_bits(&self) -> u64;

    /// Moves the cursor to an absolute bit. Positions past the end are allowed;
    /// negative ones fail with `InvalidArgument` and change nothing.
    fn set_position_bits(&mut self, bits: i64) -> Result<()>;

    /// Truncates or extends the content. A cursor left past the new end is
    /// pulled back to it.
    fn set_length_bits(&mut self, bits: u64) -> Result<()>;

    /// Reads up to `count` (at most 64) bits, right-aligned in the returned
    /// value, together with the number of bits actually read.
    fn read_bits(&mut self, count: usize) -> Result<(u64, usize)>;

    /// Writes the low `count` (at most 64) bits of `value` at the cursor.
    fn write_bits(&mut self, value: u64, count: usize) -> Result<()>;

    /// Reads whole bytes into `buf`, returning how many were read. Trailing
    /// bits that do not make up a full byte are left unread.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Writes `buf` at the cursor, overwriting in place and growing as needed.
    fn write(&mut self, buf: &[u8]) -> Result<()>;

    /// Returns a new independent stream over the next `length` bits and
    /// advances this stream's cursor past them. Content and length of this
    /// stream are not touched.
    fn slice_bits(&mut self, length: u64) -> Result<Stream>;

    fn length(&self) -> u64 {
        bits_to_bytes(self.length_bits())
    }

    fn position(&self) -> u64 {
        bits_to_bytes(self.position_bits())
    }

    fn set_position(&mut self, bytes: i64) -> Result<()> {
        if bytes < 0 {
            return Err(StreamError::negative("position"));
        }
        let bits = bytes.checked_mul(8).ok_or(StreamError::InvalidArgument {
            name: "position",
            reason: "position does not fit in a bit count",
        })?;
        self.set_position_bits(bits)
    }

    fn set_length(&mut self, bytes: u64) -> Result<()> {
        let bits = bytes.checked_mul(8).ok_or(StreamError::InvalidArgument {
            name: "length",
            reason: "length does not fit in a bit count",
        })?;
        self.set_length_bits(bits)
    }

    /// Moves the cursor relative to `anchor` and returns the new absolute bit
    /// position. A target before bit 0 fails with `InvalidSeek`; a target past
    /// the end is fine and does not grow the stream.
    fn seek_bits(&mut self, offset: i64, anchor: Anchor) -> Result<u64> {
        let base = match anchor {
            Anchor::Start => 0,
            Anchor::Current => self.position_bits(),
            Anchor::End => self.length_bits(),
        };
        let target = i128::from(base) + i128::from(offset);
        if target < 0 {
            return Err(StreamError::InvalidSeek);
        }
        let target = i64::try_from(target).map_err(|_| StreamError::InvalidArgument {
            name: "offset",
            reason: "seek target does not fit in a bit count",
        })?;
        self.set_position_bits(target)?;
        Ok(target as u64)
    }

    /// Byte-granular [`seek_bits`](Self::seek_bits); returns the new byte
    /// position.
    fn seek(&mut self, offset: i64, anchor: Anchor) -> Result<u64> {
        let bits = offset.checked_mul(8).ok_or(StreamError::InvalidArgument {
            name: "offset",
            reason: "offset does not fit in a bit count",
        })?;
        Ok(bits_to_bytes(self.seek_bits(bits, anchor)?))
    }

    fn read_bit(&mut self) -> Result<Option<bool>> {
        match self.read_bits(1)? {
            (_, 0) => Ok(None),
            (bit, _) => Ok(Some(bit == 1)),
        }
    }

    fn write_bit(&mut self, bit: bool) -> Result<()> {
        self.write_bits(u64::from(bit), 1)
    }

    fn read_byte(&mut self) -> Result<Option<u8>> {
        let mut byte = [0u8; 1];
        match self.read(&mut byte)? {
            0 => Ok(None),
            _ => Ok(Some(byte[0])),
        }
    }

    fn write_byte(&mut self, byte: u8) -> Result<()> {
        self.write(&[byte])
    }

    /// The whole content from bit 0 in `ceil(length_bits / 8)` bytes, with any
    /// trailing partial byte zero padded. The cursor is left where it was.
    fn to_vec(&mut self) -> Result<Vec<u8>> {
        let restore = self.position_bits();
        self.set_position_bits(0)?;
        let mut out = vec![0u8; bytes_needed(self.length_bits()) as usize];
        let whole = self.read(&mut out)?;
        let (bits, count) = self.read_bits(7)?;
        if count > 0 {
            out[whole] = (bits << (8 - count)) as u8;
        }
        self.place_cursor(restore)?;
        Ok(out)
    }

    /// Copies the remaining whole bytes into a byte sink and returns how many
    /// were written. Trailing partial bits are not emitted; pad first to keep
    /// them.
    fn copy_to_writer(&mut self, dest: &mut dyn io::Write) -> Result<u64> {
        let size = default_copy_size(self.length());
        let mut buffer = vec![0u8; size];
        let mut total = 0u64;
        loop {
            let n = self.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            dest.write_all(&buffer[..n])?;
            total += n as u64;
        }
        Ok(total)
    }

    /// Copies everything after the cursor into another bit stream, including
    /// trailing partial bits.
    fn copy_to(&mut self, dest: &mut dyn BitwiseStream) -> Result<()> {
        let size = default_copy_size(self.length());
        self.copy_to_with(dest, size)
    }

    /// [`copy_to`](Self::copy_to) through an intermediate buffer of
    /// `buffer_size` bytes. The buffer size never changes the output.
    fn copy_to_with(&mut self, dest: &mut dyn BitwiseStream, buffer_size: usize) -> Result<()> {
        if buffer_size == 0 {
            return Err(StreamError::InvalidArgument {
                name: "buffer_size",
                reason: "buffer size must be positive",
            });
        }
        let mut buffer = vec![0u8; buffer_size];
        loop {
            let n = self.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            dest.write(&buffer[..n])?;
        }
        let (bits, count) = self.read_bits(7)?;
        dest.write_bits(bits, count)
    }

    /// Copies at most `count` bytes into `dest`, after first skipping `offset`
    /// bytes from the cursor. A count larger than what remains is clipped; when
    /// it reaches past the last whole byte the trailing partial bits are
    /// carried as well.
    fn copy_range_to(
        &mut self,
        dest: &mut dyn BitwiseStream,
        buffer_size: usize,
        offset: u64,
        count: u64,
    ) -> Result<()> {
        if buffer_size == 0 {
            return Err(StreamError::InvalidArgument {
                name: "buffer_size",
                reason: "buffer size must be positive",
            });
        }
        let skip = i64::try_from(offset).map_err(|_| StreamError::InvalidArgument {
            name: "offset",
            reason: "offset does not fit in a seek",
        })?;
        self.seek(skip, Anchor::Current)?;

        let mut buffer = vec![0u8; buffer_size];
        // The +1 admits the partial byte, but only when the request reaches it.
        let mut remain = count.min(self.length().saturating_sub(self.position()) + 1);
        while remain > buffer_size as u64 {
            let n = self.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            dest.write(&buffer[..n])?;
            remain -= n as u64;
        }
        let tail = remain.min(buffer_size as u64) as usize;
        let n = self.read(&mut buffer[..tail])?;
        dest.write(&buffer[..n])?;
        remain -= n as u64;

        if remain > 0 {
            let (bits, count) = self.read_bits(7)?;
            dest.write_bits(bits, count)?;
        }
        Ok(())
    }

    /// Bit position of the first occurrence of `needle` at or after
    /// `offset_bits`, searching in whole-byte steps from that offset. The needle
    /// must be whole bytes. Both cursors are restored.
    fn index_of(&mut self, needle: &mut dyn BitwiseStream, offset_bits: u64) -> Result<Option<u64>> {
        if needle.length_bits() % 8 != 0 {
            return Err(StreamError::InvalidArgument {
                name: "needle",
                reason: "needle must be a whole number of bytes",
            });
        }
        if offset_bits > self.length_bits() {
            return Err(StreamError::InvalidArgument {
                name: "offset_bits",
                reason: "offset lies past the end of the stream",
            });
        }

        let needle_bytes = needle.to_vec()?;
        let restore = self.position_bits();
        self.place_cursor(offset_bits)?;
        let mut haystack = vec![0u8; bits_to_bytes(self.length_bits() - offset_bits) as usize];
        let read = self.read(&mut haystack);
        self.place_cursor(restore)?;
        let n = read?;

        if needle_bytes.is_empty() {
            return Ok(Some(offset_bits));
        }
        Ok(haystack[..n]
            .windows(needle_bytes.len())
            .position(|w| w == needle_bytes.as_slice())
            .map(|idx| offset_bits + idx as u64 * 8))
    }

    /// The content extended with zero bits up to the next byte boundary, as a
    /// new stream. Already aligned content is returned as a plain copy.
    fn pad_bits(&self) -> Result<Stream>
    where
        Self: Sized + Clone + Into<Stream>,
    {
        let extra = (8 - self.length_bits() % 8) % 8;
        let data: Stream = self.clone().into();
        if extra == 0 {
            return Ok(data);
        }
        let mut pad = LeafStream::new();
        pad.write_bits(0, extra as usize)?;
        pad.place(0);

        let mut padded = CompositeStream::new();
        padded.add(data)?;
        padded.add(pad)?;
        Ok(padded.into())
    }

    /// A new stream of exactly `length` bytes; see
    /// [`grow_to_bits`](Self::grow_to_bits).
    fn grow_to(&self, length: i64) -> Result<Stream>
    where
        Self: Sized + Clone + Into<Stream>,
    {
        if length <= 0 {
            return Ok(LeafStream::new().into());
        }
        let bits = length.checked_mul(8).ok_or(StreamError::InvalidArgument {
            name: "length",
            reason: "length does not fit in a bit count",
        })?;
        self.grow_to_bits(bits)
    }

    /// A new stream of exactly `length` bits built by repeating this stream's
    /// content from bit 0, cut at the target length. A stream without a whole
    /// byte of content repeats [`GROW_FILLER`] instead. Non-positive lengths
    /// give an empty stream. The result owns its bytes, so writing to it never
    /// reaches this stream's storage.
    fn grow_to_bits(&self, length: i64) -> Result<Stream>
    where
        Self: Sized + Clone + Into<Stream>,
    {
        if length <= 0 {
            return Ok(LeafStream::new().into());
        }
        let target = length as u64;

        let mut item: Stream = if self.length() == 0 {
            LeafStream::from_bytes(vec![GROW_FILLER]).into()
        } else {
            self.clone().into()
        };

        let mut covered = item.length_bits();
        while covered < target {
            let mut doubled = CompositeStream::new();
            doubled.add(item.clone())?;
            doubled.add(item)?;
            covered *= 2;
            item = doubled.into();
        }
        log::debug!("growing {} bits to {target} bits", self.length_bits());

        item.place_cursor(0)?;
        let bytes = item.slice_bits(target)?.to_vec()?;
        let mut grown = LeafStream::from_bytes(bytes);
        grown.set_length_bits(target)?;
        Ok(grown.into())
    }

    #[doc(hidden)]
    fn place_cursor(&mut self, bits: u64) -> Result<()> {
        let bits = i64::try_from(bits).map_err(|_| StreamError::InvalidArgument {
            name: "position_bits",
            reason: "position does not fit in a bit count",
        })?;
        self.set_position_bits(bits)
    }
}

fn default_copy_size(length: u64) -> usize {
    // A 7 bit stream has a byte length of 0, so always allow one more byte.
    length.saturating_add(1).min(BLOCK_COPY_SIZE as u64) as usize
}

/// A stream value: either a leaf or a composite of further streams.
#[derive(Clone, Debug)]
pub enum Stream {
    Leaf(LeafStream),
    Composite(CompositeStream),
}

impl Stream {
    pub fn as_leaf(&self) -> Option<&LeafStream> {
        match self {
            Stream::Leaf(leaf) => Some(leaf),
            Stream::Composite(_) => None,
        }
    }

    pub fn as_composite(&self) -> Option<&CompositeStream> {
        match self {
            Stream::Leaf(_) => None,
            Stream::Composite(list) => Some(list),
        }
    }

    pub fn as_composite_mut(&mut self) -> Option<&mut CompositeStream> {
        match self {
            Stream::Leaf(_) => None,
            Stream::Composite(list) => Some(list),
        }
    }

    /// Bit offset at which the first stream named `name` begins, searching
    /// depth first and starting with this stream itself.
    pub fn position_of(&self, name: &str) -> Option<u64> {
        match self {
            Stream::Leaf(leaf) => (leaf.name() == Some(name)).then_some(0),
            Stream::Composite(list) => list.position_of(name),
        }
    }

    /// Name of the leaf that holds bit `bit`, if that leaf is named.
    pub fn name_at(&self, bit: u64) -> Option<&str> {
        match self {
            Stream::Leaf(leaf) if bit < leaf.length_bits() => leaf.name(),
            Stream::Leaf(_) => None,
            Stream::Composite(list) => list.name_at(bit),
        }
    }

    pub(crate) fn place(&mut self, bits: u64) {
        match self {
            Stream::Leaf(leaf) => leaf.place(bits),
            Stream::Composite(list) => list.place(bits),
        }
    }
}

impl From<LeafStream> for Stream {
    fn from(leaf: LeafStream) -> Self {
        Stream::Leaf(leaf)
    }
}

impl From<CompositeStream> for Stream {
    fn from(list: CompositeStream) -> Self {
        Stream::Composite(list)
    }
}

impl BitwiseStream for Stream {
    fn name(&self) -> Option<&str> {
        match self {
            Stream::Leaf(s) => s.name(),
            Stream::Composite(s) => s.name(),
        }
    }

    fn set_name(&mut self, name: Option<String>) {
        match self {
            Stream::Leaf(s) => s.set_name(name),
            Stream::Composite(s) => s.set_name(name),
        }
    }

    fn length_bits(&self) -> u64 {
        match self {
            Stream::Leaf(s) => s.length_bits(),
            Stream::Composite(s) => s.length_bits(),
        }
    }

    fn position_bits(&self) -> u64 {
        match self {
            Stream::Leaf(s) => s.position_bits(),
            Stream::Composite(s) => s.position_bits(),
        }
    }

    fn set_position_bits(&mut self, bits: i64) -> Result<()> {
        match self {
            Stream::Leaf(s) => s.set_position_bits(bits),
            Stream::Composite(s) => s.set_position_bits(bits),
        }
    }

    fn set_length_bits(&mut self, bits: u64) -> Result<()> {
        match self {
            Stream::Leaf(s) => s.set_length_bits(bits),
            Stream::Composite(s) => s.set_length_bits(bits),
        }
    }

    fn read_bits(&mut self, count: usize) -> Result<(u64, usize)> {
        match self {
            Stream::Leaf(s) => s.read_bits(count),
            Stream::Composite(s) => s.read_bits(count),
        }
    }

    fn write_bits(&mut self, value: u64, count: usize) -> Result<()> {
        match self {
            Stream::Leaf(s) => s.write_bits(value, count),
            Stream::Composite(s) => s.write_bits(value, count),
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self {
            Stream::Leaf(s) => s.read(buf),
            Stream::Composite(s) => s.read(buf),
        }
    }

    fn write(&mut self, buf: &[u8]) -> Result<()> {
        match self {
            Stream::Leaf(s) => s.write(buf),
            Stream::Composite(s) => s.write(buf),
        }
    }

    fn slice_bits(&mut self, length: u64) -> Result<Stream> {
        match self {
            Stream::Leaf(s) => s.slice_bits(length),
            Stream::Composite(s) => s.slice_bits(length),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use rand_chacha::ChaCha8Rng;
    use rand_core::SeedableRng;

    fn hex(bytes: &[u8]) -> String {
        bytes
            .iter()
            .map(|b| format!("{b:02X}"))
            .collect::<Vec<_>>()
            .join("-")
    }

    /// "Hello" followed by four bits of 0x2: 44 bits in total.
    fn hello_44() -> LeafStream {
        let mut bs = LeafStream::new();
        bs.write(b"Hello").unwrap();
        bs.write_bits(0x2, 4).unwrap();
        bs.seek_bits(0, Anchor::Start).unwrap();
        bs
    }

    fn framed_hello(pre: &str, post: &str) -> LeafStream {
        let mut bs = LeafStream::new();
        for bit in pre.chars() {
            bs.write_bit(bit == '1').unwrap();
        }
        bs.write(b"Hello").unwrap();
        for bit in post.chars() {
            bs.write_bit(bit == '1').unwrap();
        }
        bs.seek(0, Anchor::Start).unwrap();
        bs
    }

    #[test]
    fn copy_to_writer_emits_only_whole_bytes() {
        let mut bs = hello_44();
        assert_eq!(bs.length(), 5);
        assert_eq!(bs.length_bits(), 44);

        let mut dst: Vec<u8> = Vec::new();
        assert_eq!(bs.copy_to_writer(&mut dst).unwrap(), 5);
        assert_eq!(dst, b"Hello".to_vec());
    }

    #[test]
    fn padded_copy_keeps_the_trailing_bits() {
        let bs = hello_44();
        let mut padded = bs.pad_bits().unwrap();
        assert_eq!(padded.length_bits(), 48);
        assert_eq!(bs.length_bits(), 44, "padding never touches the source");

        let mut dst: Vec<u8> = Vec::new();
        assert_eq!(padded.copy_to_writer(&mut dst).unwrap(), 6);
        assert_eq!(hex(&dst), "48-65-6C-6C-6F-20");
    }

    #[test]
    fn pad_bits_on_aligned_content_is_a_plain_copy() {
        let bs = LeafStream::from_bytes(b"ab".to_vec());
        let padded = bs.pad_bits().unwrap();
        assert!(padded.as_leaf().is_some());
        assert_eq!(padded.length_bits(), 16);
    }

    #[test]
    fn copy_to_bit_stream_carries_trailing_bits() {
        let mut bs = hello_44();
        let mut dst = LeafStream::new();
        bs.copy_to_with(&mut dst, 1).unwrap();

        assert_eq!(dst.length(), 5);
        assert_eq!(dst.position(), 5);
        assert_eq!(dst.length_bits(), 44);
        assert_eq!(hex(&dst.to_vec().unwrap()), "48-65-6C-6C-6F-20");

        let mut bs = hello_44();
        let mut dst = LeafStream::new();
        bs.copy_to(&mut dst).unwrap();
        assert_eq!(hex(&dst.to_vec().unwrap()), "48-65-6C-6C-6F-20");
    }

    #[test]
    fn zero_buffer_size_is_rejected() {
        let mut bs = hello_44();
        let mut dst = LeafStream::new();
        assert!(matches!(
            bs.copy_to_with(&mut dst, 0),
            Err(StreamError::InvalidArgument { name: "buffer_size", .. })
        ));
        assert!(matches!(
            bs.copy_range_to(&mut dst, 0, 0, 1),
            Err(StreamError::InvalidArgument { name: "buffer_size", .. })
        ));
    }

    #[test]
    fn copy_range_matches_the_reference_table() {
        let cases: &[(&str, &str, usize, u64, u64, &str)] = &[
            ("", "", 1, 1, 1, "65"),
            ("", "", 1, 1, 3, "65-6C-6C"),
            ("", "", 1, 1, 4, "65-6C-6C-6F"),
            ("", "", 1, 0, 3, "48-65-6C"),
            ("", "", 1, 0, 5, "48-65-6C-6C-6F"),
            ("", "", 1, 0, 10, "48-65-6C-6C-6F"),
            ("", "", 2, 1, 1, "65"),
            ("", "", 2, 1, 3, "65-6C-6C"),
            ("", "", 2, 1, 4, "65-6C-6C-6F"),
            ("", "", 2, 0, 3, "48-65-6C"),
            ("", "", 2, 0, 5, "48-65-6C-6C-6F"),
            ("", "", 2, 0, 10, "48-65-6C-6C-6F"),
            ("", "", 3, 1, 1, "65"),
            ("", "", 3, 1, 3, "65-6C-6C"),
            ("", "", 3, 1, 4, "65-6C-6C-6F"),
            ("", "", 3, 0, 3, "48-65-6C"),
            ("", "", 3, 0, 5, "48-65-6C-6C-6F"),
            ("", "", 3, 0, 10, "48-65-6C-6C-6F"),
            ("", "", 20, 1, 1, "65"),
            ("", "", 20, 1, 3, "65-6C-6C"),
            ("", "", 20, 1, 4, "65-6C-6C-6F"),
            ("", "", 20, 0, 3, "48-65-6C"),
            ("", "", 20, 0, 5, "48-65-6C-6C-6F"),
            ("", "", 20, 0, 10, "48-65-6C-6C-6F"),
            ("0010", "", 20, 0, 1, "24"),
            ("0010", "", 20, 1, 2, "86-56"),
            ("0010", "", 20, 1, 5, "86-56-C6-C6-F0"),
            ("0010", "", 20, 0, 5, "24-86-56-C6-C6"),
            ("0010", "", 20, 0, 10, "24-86-56-C6-C6-F0"),
            ("", "0010", 20, 0, 1, "48"),
            ("", "0010", 20, 1, 2, "65-6C"),
            ("", "0010", 20, 1, 5, "65-6C-6C-6F-20"),
            ("", "0010", 20, 0, 5, "48-65-6C-6C-6F"),
            ("", "0010", 20, 0, 10, "48-65-6C-6C-6F-20"),
            ("0010", "0010", 20, 0, 1, "24"),
            ("0010", "0010", 20, 1, 2, "86-56"),
            ("0010", "0010", 20, 0, 5, "24-86-56-C6-C6"),
            ("0010", "0010", 20, 1, 5, "86-56-C6-C6-F2"),
            ("0010", "0010", 20, 0, 10, "24-86-56-C6-C6-F2"),
        ];

        for &(pre, post, buffer_size, offset, count, expected) in cases {
            let mut bs = framed_hello(pre, post);
            let mut dst = LeafStream::new();
            bs.copy_range_to(&mut dst, buffer_size, offset, count).unwrap();
            assert_eq!(
                hex(&dst.to_vec().unwrap()),
                expected,
                "pre={pre:?} post={post:?} buffer_size={buffer_size} offset={offset} count={count}"
            );
        }
    }

    #[test]
    fn buffer_size_never_changes_copy_output() {
        let mut rng = ChaCha8Rng::from_seed([3; 32]);
        let mut source = LeafStream::new();
        for _ in 0..37 {
            source.write_byte(rng.random()).unwrap();
        }
        source.write_bits(0x5, 3).unwrap();

        for _ in 0..50 {
            let offset = rng.random_range(0..40u64);
            let count = rng.random_range(0..50u64);
            let mut reference: Option<Vec<u8>> = None;
            for buffer_size in [1usize, 2, 3, 7, 20, 64] {
                let mut src = source.clone();
                src.set_position_bits(0).unwrap();
                let mut dst = LeafStream::new();
                src.copy_range_to(&mut dst, buffer_size, offset, count).unwrap();
                let out = dst.to_vec().unwrap();
                match &reference {
                    None => reference = Some(out),
                    Some(expected) => assert_eq!(
                        &out, expected,
                        "offset={offset} count={count} buffer_size={buffer_size}"
                    ),
                }
            }
        }
    }

    #[test]
    fn grow_to_replicates_or_fills() {
        let src = LeafStream::new();
        let mut dst = src.grow_to(100).unwrap();
        assert_eq!(dst.length(), 100);
        assert_eq!(dst.to_vec().unwrap(), vec![GROW_FILLER; 100]);

        let mut src = LeafStream::from_bytes(b"ABC".to_vec());
        let mut dst = src.grow_to(2).unwrap();
        assert_eq!(dst.length(), 2);
        assert_eq!(dst.to_vec().unwrap(), b"AB".to_vec());

        for target in [-1, 0] {
            let mut dst = src.grow_to(target).unwrap();
            assert_eq!(dst.length(), 0);
            assert!(dst.to_vec().unwrap().is_empty());
        }

        let mut dst = src.grow_to(3).unwrap();
        assert_eq!(dst.length(), 3);
        assert_eq!(dst.to_vec().unwrap(), src.to_vec().unwrap());

        let mut dst = src.grow_to(8).unwrap();
        assert_eq!(dst.to_vec().unwrap(), b"ABCABCAB".to_vec());
        assert_eq!(src.to_vec().unwrap(), b"ABC".to_vec(), "source is unchanged");
        assert_eq!(src.length(), 3);
    }

    #[test]
    fn grow_to_bits_replicates_partial_content() {
        let mut src = LeafStream::new();
        src.write_bits(0xfffff, 20).unwrap();
        src.set_position(0).unwrap();

        let mut dst = src.grow_to_bits(28).unwrap();
        assert_eq!(dst.length_bits(), 28);
        assert_eq!(dst.read_bits(28).unwrap(), (0xfffffff, 28));

        for target in [-1, 0] {
            let mut dst = src.grow_to_bits(target).unwrap();
            assert_eq!(dst.length_bits(), 0);
            assert!(dst.to_vec().unwrap().is_empty());
        }

        let mut dst = src.grow_to_bits(20).unwrap();
        assert_eq!(dst.length_bits(), 20);
        assert_eq!(dst.read_bits(28).unwrap(), (0xfffff, 20));
        assert_eq!(src.position_bits(), 0);
    }

    #[test]
    fn grow_does_not_move_the_source_cursor() {
        let mut src = LeafStream::from_bytes(b"xyz".to_vec());
        src.seek_bits(5, Anchor::Start).unwrap();
        let mut dst = src.grow_to(5).unwrap();
        assert_eq!(src.position_bits(), 5);
        assert_eq!(dst.to_vec().unwrap(), b"xyzxy".to_vec());
    }

    #[test]
    fn index_of_finds_byte_aligned_needles() {
        let mut haystack = LeafStream::from_bytes(b"aabcd".to_vec());
        let mut needle = LeafStream::from_bytes(b"abc".to_vec());
        haystack.seek(2, Anchor::Start).unwrap();

        assert_eq!(haystack.index_of(&mut needle, 0).unwrap(), Some(8));
        assert_eq!(haystack.position(), 2, "cursor is restored");
        assert_eq!(haystack.index_of(&mut needle, 16).unwrap(), None);
        assert_eq!(haystack.index_of(&mut needle, 8).unwrap(), Some(8));
        assert_eq!(haystack.index_of(&mut needle, 4).unwrap(), None, "search steps from the offset");

        let mut missing = LeafStream::from_bytes(b"zz".to_vec());
        assert_eq!(haystack.index_of(&mut missing, 0).unwrap(), None);

        let mut ragged = LeafStream::new();
        ragged.write_bits(1, 3).unwrap();
        assert!(matches!(
            haystack.index_of(&mut ragged, 0),
            Err(StreamError::InvalidArgument { name: "needle", .. })
        ));
        assert!(matches!(
            haystack.index_of(&mut needle, 41),
            Err(StreamError::InvalidArgument { name: "offset_bits", .. })
        ));
    }

    #[test]
    fn to_vec_restores_the_cursor() {
        let mut bs = hello_44();
        bs.seek_bits(13, Anchor::Start).unwrap();
        assert_eq!(hex(&bs.to_vec().unwrap()), "48-65-6C-6C-6F-20");
        assert_eq!(bs.position_bits(), 13);
    }

    #[test]
    fn stream_enum_delegates_to_its_variant() {
        let mut stream: Stream = LeafStream::from_bytes(b"hi".to_vec()).with_name("greeting").into();
        assert_eq!(stream.name(), Some("greeting"));
        assert_eq!(stream.position_of("greeting"), Some(0));
        assert_eq!(stream.name_at(15), Some("greeting"));
        assert_eq!(stream.name_at(16), None);
        assert_eq!(stream.read_byte().unwrap(), Some(b'h'));
        stream.set_name(None);
        assert_eq!(stream.position_of("greeting"), None);
    }
}
