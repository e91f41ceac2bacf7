use integer_encoding::VarInt;

use crate::error::{Result, Status, StatusCode};

/// Maximum length of a varint-encoded block handle.
pub const MAX_HANDLE_LENGTH: usize = 10 + 10;

/// A BlockHandle locates a block inside a file: `(offset, size)`, both varint-encoded.
/// An offset of zero is legal; the first block of every table lives there.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BlockHandle {
    offset: usize,
    size: usize,
}

impl BlockHandle {
    pub fn new(offset: usize, size: usize) -> BlockHandle {
        BlockHandle { offset, size }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn set_offset(&mut self, offset: usize) {
        self.offset = offset;
    }

    pub fn set_size(&mut self, size: usize) {
        self.size = size;
    }

    /// Decodes a handle from the start of `from`, returning it together with how many
    /// bytes were read.
    pub fn decode(from: &[u8]) -> Result<(BlockHandle, usize)> {
        let (offset, offsize) = usize::decode_var(from)
            .ok_or_else(|| Status::new(StatusCode::Corruption, "bad block handle offset"))?;
        let (size, szsize) = usize::decode_var(&from[offsize..])
            .ok_or_else(|| Status::new(StatusCode::Corruption, "bad block handle size"))?;

        Ok((BlockHandle { offset, size }, offsize + szsize))
    }

    /// Writes the handle into the front of `dst` and returns how many bytes it used.
    pub fn encode_to(&self, dst: &mut [u8]) -> usize {
        assert!(dst.len() >= self.offset.required_space() + self.size.required_space());

        let off = self.offset.encode_var(dst);
        off + self.size.encode_var(&mut dst[off..])
    }

    /// The handle as an owned varint string, for storing in index blocks.
    pub fn encoded(&self) -> Vec<u8> {
        let mut buf = [0u8; MAX_HANDLE_LENGTH];
        let len = self.encode_to(&mut buf);
        buf[..len].to_vec()
    }
}
