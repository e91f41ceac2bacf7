//! Builds sorted tables. A table is a sequence of blocks:
//!
//! ```text
//! [data block]*  [filter block]  [metaindex block]  [index block]  [footer]
//! ```
//!
//! Each block is followed by a 5-byte trailer: a compression type byte and the masked
//! CRC32C of the stored bytes plus that type byte. The footer occupies the last 48
//! bytes: the metaindex and index block handles, zero padding to 40 bytes, and the
//! magic number, big-endian.

use std::cmp::Ordering;
use std::sync::Arc;

use crc::{crc32, Hasher32};

use crate::block::BlockContents;
use crate::block_builder::BlockBuilder;
use crate::blockhandle::BlockHandle;
use crate::cmp::InternalKeyCmp;
use crate::coding::{mask_crc, put_fixed_u32};
use crate::env::WritableFile;
use crate::error::{Result, Status, StatusCode};
use crate::filter::InternalFilterPolicy;
use crate::filter_block::FilterBlockBuilder;
use crate::key_types::InternalKey;
use crate::options::{CompressionType, Options};

pub const FOOTER_LENGTH: usize = 40;
pub const FULL_FOOTER_LENGTH: usize = FOOTER_LENGTH + 8;
pub const MAGIC_FOOTER_NUMBER: u64 = 0xdb4775248b80fb57;
pub const MAGIC_FOOTER_ENCODED: [u8; 8] = [0xdb, 0x47, 0x75, 0x24, 0x8b, 0x80, 0xfb, 0x57];

// One compression-type byte plus the four checksum bytes.
pub const BLOCK_TRAILER_SIZE: usize = 5;

/// Footer is a helper for encoding/decoding a table footer.
#[derive(Debug, Clone)]
pub struct Footer {
    pub meta_index: BlockHandle,
    pub index: BlockHandle,
}

impl Footer {
    pub fn new(meta_index: BlockHandle, index: BlockHandle) -> Footer {
        Footer { meta_index, index }
    }

    pub fn decode(from: &[u8]) -> Result<Footer> {
        if from.len() < FULL_FOOTER_LENGTH {
            return Err(Status::new(StatusCode::Corruption, "footer too short"));
        }
        if from[FOOTER_LENGTH..FULL_FOOTER_LENGTH] != MAGIC_FOOTER_ENCODED {
            return Err(Status::new(StatusCode::Corruption, "bad table magic number"));
        }
        let (meta_index, metalen) = BlockHandle::decode(from)?;
        let (index, _) = BlockHandle::decode(&from[metalen..])?;

        Ok(Footer { meta_index, index })
    }

    pub fn encode(&self, to: &mut [u8]) {
        assert!(to.len() >= FULL_FOOTER_LENGTH);

        let s1 = self.meta_index.encode_to(to);
        let s2 = self.index.encode_to(&mut to[s1..]);

        for byte in to.iter_mut().take(FOOTER_LENGTH).skip(s1 + s2) {
            *byte = 0;
        }
        to[FOOTER_LENGTH..FULL_FOOTER_LENGTH].copy_from_slice(&MAGIC_FOOTER_ENCODED);
    }
}

/// The masked checksum stored in a block trailer, covering the block contents and the
/// compression type byte.
pub fn block_checksum(contents: &[u8], ctype: u8) -> u32 {
    let mut digest = crc32::Digest::new(crc32::CASTAGNOLI);
    digest.write(contents);
    digest.write(&[ctype]);
    mask_crc(digest.sum32())
}

/// Groups added entries into data blocks, maintains the filter and index blocks and
/// writes the whole table to `dst`. Keys must arrive in strictly increasing order.
pub struct TableBuilder<Dst: WritableFile> {
    opt: Options,
    dst: Dst,

    offset: usize,
    num_entries: usize,
    closed: bool,

    data_block: BlockBuilder,
    index_block: BlockBuilder,
    filter_block: Option<FilterBlockBuilder>,

    // The index entry for a finished data block is not emitted until the first key of
    // the next block is known, so the separator between the two can be short. While it
    // is pending, the data block must stay empty.
    pending_index_entry: bool,
    pending_handle: BlockHandle,

    last_key: Vec<u8>,
}

impl<Dst: WritableFile> TableBuilder<Dst> {
    /// Creates a builder for a table of internal keys: the comparator is wrapped in an
    /// `InternalKeyCmp` and the filter policy in an `InternalFilterPolicy`.
    pub fn new(mut opt: Options, dst: Dst) -> TableBuilder<Dst> {
        opt.cmp = Arc::new(Box::new(InternalKeyCmp(opt.cmp.clone())));
        if let Some(fp) = opt.filter_policy.take() {
            opt.filter_policy = Some(InternalFilterPolicy::new_wrap(fp));
        }
        TableBuilder::new_raw(opt, dst)
    }

    /// Creates a builder that treats keys as opaque byte strings.
    pub fn new_raw(opt: Options, dst: Dst) -> TableBuilder<Dst> {
        let mut index_opt = opt.clone();
        // Every index entry is its own restart point, so index seeks binary-search.
        index_opt.block_restart_interval = 1;

        let filter_block = opt
            .filter_policy
            .clone()
            .map(FilterBlockBuilder::new);

        TableBuilder {
            opt: opt.clone(),
            dst,
            offset: 0,
            num_entries: 0,
            closed: false,
            data_block: BlockBuilder::new(opt),
            index_block: BlockBuilder::new(index_opt),
            filter_block,
            pending_index_entry: false,
            pending_handle: BlockHandle::default(),
            last_key: Vec::new(),
        }
    }

    /// Adopts new options mid-build. The comparator may not change.
    pub fn change_options(&mut self, mut opt: Options) -> Result<()> {
        if opt.cmp.id() != self.opt.cmp.id() {
            return Err(Status::new(
                StatusCode::InvalidArgument,
                "changing comparator while building table",
            ));
        }
        opt.cmp = self.opt.cmp.clone();
        self.opt = opt;
        Ok(())
    }

    pub fn num_entries(&self) -> usize {
        self.num_entries
    }

    /// The number of bytes written so far.
    pub fn file_size(&self) -> usize {
        self.offset
    }

    pub fn add(&mut self, key: InternalKey, value: &[u8]) -> Result<()> {
        if self.closed {
            return Err(Status::new(StatusCode::Corruption, "add on closed builder"));
        }
        if self.num_entries > 0 && self.opt.cmp.cmp(key, &self.last_key) != Ordering::Greater {
            return Err(Status::new(StatusCode::Corruption, "keys added out of order"));
        }

        if self.pending_index_entry {
            if !self.data_block.is_empty() {
                return Err(Status::new(
                    StatusCode::Corruption,
                    "pending index entry with non-empty data block",
                ));
            }
            let sep = self.opt.cmp.find_shortest_sep(&self.last_key, key);
            self.index_block.add(&sep, &self.pending_handle.encoded())?;
            self.pending_index_entry = false;
        }

        if let Some(fb) = self.filter_block.as_mut() {
            fb.add_key(key);
        }

        self.last_key.clear();
        self.last_key.extend_from_slice(key);
        self.num_entries += 1;
        self.data_block.add(key, value)?;

        if self.data_block.current_size_estimate() >= self.opt.block_size {
            self.flush()?;
        }
        Ok(())
    }

    /// Writes out the current data block, if any, and starts a new one.
    pub fn flush(&mut self) -> Result<()> {
        if self.closed {
            return Err(Status::new(StatusCode::Corruption, "flush on closed builder"));
        }
        if self.data_block.is_empty() {
            return Ok(());
        }
        if self.pending_index_entry {
            return Err(Status::new(
                StatusCode::Corruption,
                "flush with pending index entry",
            ));
        }

        let contents = self.data_block.finish();
        self.data_block.reset();
        let mut handle = BlockHandle::default();
        self.write_block(contents, &mut handle)?;
        self.pending_handle = handle;
        self.pending_index_entry = true;
        self.dst.flush()?;

        if let Some(fb) = self.filter_block.as_mut() {
            fb.start_block(self.offset)?;
        }
        Ok(())
    }

    /// Compresses finished block contents if configured and profitable, then appends
    /// them. Compression is only kept when it saves at least one eighth of the size.
    fn write_block(&mut self, raw: BlockContents, handle: &mut BlockHandle) -> Result<()> {
        let mut ctype = self.opt.compression_type;

        let contents = match ctype {
            CompressionType::CompressionNone => raw,
            CompressionType::CompressionSnappy => {
                match snap::raw::Encoder::new().compress_vec(&raw) {
                    Ok(compressed) if compressed.len() < raw.len() - raw.len() / 8 => compressed,
                    _ => {
                        ctype = CompressionType::CompressionNone;
                        raw
                    }
                }
            }
            CompressionType::CompressionZstd => {
                // No zstd backend in this build; store uncompressed.
                ctype = CompressionType::CompressionNone;
                raw
            }
        };

        self.write_raw_block(&contents, ctype, handle)
    }

    fn write_raw_block(
        &mut self,
        contents: &[u8],
        ctype: CompressionType,
        handle: &mut BlockHandle,
    ) -> Result<()> {
        handle.set_offset(self.offset);
        handle.set_size(contents.len());

        self.dst.append(contents)?;

        let mut trailer = Vec::with_capacity(BLOCK_TRAILER_SIZE);
        trailer.push(ctype as u8);
        put_fixed_u32(&mut trailer, block_checksum(contents, ctype as u8));
        self.dst.append(&trailer)?;

        self.offset += contents.len() + BLOCK_TRAILER_SIZE;
        Ok(())
    }

    /// Finishes the table: the remaining data block, the filter block, the metaindex
    /// block, the index block and the footer. Returns the total file size.
    pub fn finish(mut self) -> Result<usize> {
        self.flush()?;
        self.closed = true;

        // Filter block, stored uncompressed.
        let mut filter_entry = None;
        if let Some(fb) = self.filter_block.take() {
            let name = fb.filter_name();
            let contents = fb.finish();
            let mut handle = BlockHandle::default();
            self.write_raw_block(&contents, CompressionType::CompressionNone, &mut handle)?;
            filter_entry = Some((name, handle));
        }

        // Metaindex block, mapping "filter.<name>" to the filter block's handle.
        let mut meta_ix_block = BlockBuilder::new(self.opt.clone());
        if let Some((name, handle)) = filter_entry {
            let key = format!("filter.{}", name);
            meta_ix_block.add(key.as_bytes(), &handle.encoded())?;
        }
        let mut meta_ix_handle = BlockHandle::default();
        let contents = meta_ix_block.finish();
        self.write_block(contents, &mut meta_ix_handle)?;

        // Index block; the last data block's entry uses a short successor of the
        // largest key instead of a separator.
        if self.pending_index_entry {
            let succ = self.opt.cmp.find_short_succ(&self.last_key);
            self.index_block.add(&succ, &self.pending_handle.encoded())?;
            self.pending_index_entry = false;
        }
        let mut index_handle = BlockHandle::default();
        let contents = self.index_block.finish();
        self.write_block(contents, &mut index_handle)?;

        // Footer.
        let footer = Footer::new(meta_ix_handle, index_handle);
        let mut buf = [0u8; FULL_FOOTER_LENGTH];
        footer.encode(&mut buf);
        self.dst.append(&buf)?;
        self.offset += buf.len();
        self.dst.flush()?;

        Ok(self.offset)
    }

    /// Abandons the build: the builder is consumed and nothing further is written.
    pub fn abandon(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coding::{decode_fixed_u32, unmask_crc};

    #[test]
    fn test_footer_roundtrip() {
        let f = Footer::new(BlockHandle::new(44, 4), BlockHandle::new(55, 5));
        let mut buf = [0u8; FULL_FOOTER_LENGTH];
        f.encode(&mut buf);
        assert_eq!(&buf[FOOTER_LENGTH..], &MAGIC_FOOTER_ENCODED);

        let f2 = Footer::decode(&buf).unwrap();
        assert_eq!(f2.meta_index.offset(), 44);
        assert_eq!(f2.meta_index.size(), 4);
        assert_eq!(f2.index.offset(), 55);
        assert_eq!(f2.index.size(), 5);
    }

    #[test]
    fn test_footer_bad_magic() {
        let f = Footer::new(BlockHandle::new(1, 2), BlockHandle::new(3, 4));
        let mut buf = [0u8; FULL_FOOTER_LENGTH];
        f.encode(&mut buf);
        buf[FULL_FOOTER_LENGTH - 1] ^= 0xff;

        let err = Footer::decode(&buf).unwrap_err();
        assert_eq!(err.code, StatusCode::Corruption);
    }

    #[test]
    fn test_magic_is_big_endian() {
        assert_eq!(u64::from_be_bytes(MAGIC_FOOTER_ENCODED), MAGIC_FOOTER_NUMBER);
    }

    fn test_entries() -> Vec<(&'static [u8], &'static [u8])> {
        vec![
            (b"abc", b"def"),
            (b"abd", b"dee"),
            (b"bcd", b"asa"),
            (b"bsr", b"a00"),
        ]
    }

    #[test]
    fn test_table_builder_basic() {
        let mut dst = Vec::with_capacity(512);
        let opt = Options {
            block_restart_interval: 3,
            ..Default::default()
        };

        let mut b = TableBuilder::new_raw(opt, &mut dst);
        for (k, v) in test_entries() {
            b.add(k, v).unwrap();
        }
        assert_eq!(b.num_entries(), 4);

        let size = b.finish().unwrap();
        assert_eq!(size, dst.len());
        // One data block, one (empty metaindex) block, one index block, three
        // trailers, and the footer.
        assert!(size > FULL_FOOTER_LENGTH + 3 * BLOCK_TRAILER_SIZE);
    }

    #[test]
    fn test_table_builder_out_of_order() {
        let mut dst = Vec::new();
        let mut b = TableBuilder::new_raw(Options::default(), &mut dst);

        b.add(b"abc", b"def").unwrap();
        assert!(b.add(b"abc", b"dee").is_err());
        assert!(b.add(b"abb", b"x").is_err());
        assert!(b.add(b"abd", b"x").is_ok());
    }

    #[test]
    fn test_table_builder_offsets_and_checksums() {
        let mut dst = Vec::with_capacity(512);
        let mut b = TableBuilder::new_raw(Options::default(), &mut dst);
        for (k, v) in test_entries() {
            b.add(k, v).unwrap();
        }
        let size = b.finish().unwrap();

        // The footer decodes and its handles point at verifiable blocks.
        let footer = Footer::decode(&dst[size - FULL_FOOTER_LENGTH..]).unwrap();
        for handle in [footer.meta_index, footer.index] {
            let contents = &dst[handle.offset()..handle.offset() + handle.size()];
            let ctype = dst[handle.offset() + handle.size()];
            let stored = decode_fixed_u32(&dst[handle.offset() + handle.size() + 1..]);
            assert_eq!(stored, block_checksum(contents, ctype));
            assert_eq!(unmask_crc(stored), unmask_crc(block_checksum(contents, ctype)));
        }
        // The index block comes last before the footer: offset + size + trailer ==
        // start of footer. write_raw_block advanced the offset by exactly that much.
        assert_eq!(
            footer.index.offset() + footer.index.size() + BLOCK_TRAILER_SIZE,
            size - FULL_FOOTER_LENGTH
        );
    }

    #[test]
    fn test_table_builder_flush_makes_blocks() {
        let mut dst = Vec::new();
        let opt = Options {
            block_size: 32,
            block_restart_interval: 2,
            ..Default::default()
        };
        let mut b = TableBuilder::new_raw(opt, &mut dst);
        for (k, v) in test_entries() {
            b.add(k, v).unwrap();
        }
        // A tiny block size forces flushes along the way.
        assert!(b.file_size() > 0);
        b.finish().unwrap();
    }

    #[test]
    fn test_table_builder_change_options() {
        let mut dst = Vec::new();
        let mut b = TableBuilder::new_raw(Options::default(), &mut dst);

        let new_opt = Options {
            block_size: 64,
            ..Default::default()
        };
        b.change_options(new_opt).unwrap();
        assert_eq!(b.opt.block_size, 64);
    }

    #[test]
    fn test_table_builder_abandon() {
        let mut dst = Vec::new();
        let b = TableBuilder::new_raw(Options::default(), &mut dst);
        b.abandon();
        assert!(dst.is_empty());
    }
}
