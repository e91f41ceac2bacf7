//! Reads tables produced by `TableBuilder`: footer, index and metaindex blocks are
//! loaded up front; data blocks are fetched and checksum-verified on demand.

use std::cmp::Ordering;
use std::io::{Read, Seek, SeekFrom};
use std::sync::Arc;

use crate::block::Block;
use crate::blockhandle::BlockHandle;
use crate::cmp::{DefaultCmp, InternalKeyCmp};
use crate::error::{Result, Status, StatusCode};
use crate::filter::InternalFilterPolicy;
use crate::filter_block::FilterBlockReader;
use crate::key_types::InternalKey;
use crate::options::{int_to_compression_type, CompressionType, Options};
use crate::table_builder::{self, block_checksum, Footer};
use crate::types::SsIterator;

/// Reads the table footer from the end of the file.
fn read_footer<R: Read + Seek>(f: &mut R, size: usize) -> Result<Footer> {
    if size < table_builder::FULL_FOOTER_LENGTH {
        return Err(Status::new(StatusCode::Corruption, "file too short for footer"));
    }
    f.seek(SeekFrom::Start(
        (size - table_builder::FULL_FOOTER_LENGTH) as u64,
    ))?;
    let mut buf = [0; table_builder::FULL_FOOTER_LENGTH];
    f.read_exact(&mut buf)?;
    Footer::decode(&buf)
}

fn read_bytes<R: Read + Seek>(f: &mut R, location: &BlockHandle) -> Result<Vec<u8>> {
    f.seek(SeekFrom::Start(location.offset() as u64))?;

    let mut buf = vec![0; location.size()];
    f.read_exact(&mut buf)?;
    Ok(buf)
}

/// Reads one block's stored bytes plus trailer, verifies the checksum and undoes the
/// compression. Returns the plain block contents.
fn read_block_contents<R: Read + Seek>(
    opt: &Options,
    f: &mut R,
    location: &BlockHandle,
) -> Result<Vec<u8>> {
    let buf = read_bytes(f, location)?;
    let trailer = read_bytes(
        f,
        &BlockHandle::new(
            location.offset() + location.size(),
            table_builder::BLOCK_TRAILER_SIZE,
        ),
    )?;

    let ctype_byte = trailer[0];
    let stored_checksum = crate::coding::decode_fixed_u32(&trailer[1..]);
    if stored_checksum != block_checksum(&buf, ctype_byte) {
        if let Some(ref l) = opt.log {
            log!(l, "checksum mismatch in block at offset {}", location.offset());
        }
        return Err(Status::new(StatusCode::Corruption, "block checksum mismatch"));
    }

    match int_to_compression_type(ctype_byte as u32) {
        Some(CompressionType::CompressionNone) => Ok(buf),
        Some(CompressionType::CompressionSnappy) => snap::raw::Decoder::new()
            .decompress_vec(&buf)
            .map_err(|e| Status::new(StatusCode::Corruption, &e.to_string())),
        Some(CompressionType::CompressionZstd) => Err(Status::new(
            StatusCode::NotSupported,
            "zstd-compressed block",
        )),
        None => Err(Status::new(StatusCode::Corruption, "unknown compression type")),
    }
}

pub struct Table<R: Read + Seek> {
    file: R,
    opt: Options,
    index_block: Block,
    filters: Option<FilterBlockReader>,
}

impl<R: Read + Seek> Table<R> {
    /// Opens a table whose keys are opaque byte strings under `opt.cmp`.
    pub fn new_raw(opt: Options, mut file: R, size: usize) -> Result<Table<R>> {
        let footer = read_footer(&mut file, size)?;

        let index_contents = read_block_contents(&opt, &mut file, &footer.index)?;
        let index_block = Block::new(opt.clone(), index_contents);

        // The metaindex maps short ASCII names; it is always read bytewise.
        let metaindex_contents = read_block_contents(&opt, &mut file, &footer.meta_index)?;
        let mut metaindex_opt = opt.clone();
        metaindex_opt.cmp = Arc::new(Box::new(DefaultCmp));
        let metaindex_block = Block::new(metaindex_opt, metaindex_contents);

        let mut filters = None;
        if let Some(ref policy) = opt.filter_policy {
            let filter_name = format!("filter.{}", policy.name()).into_bytes();

            let mut metaindex_iter = metaindex_block.iter();
            metaindex_iter.seek(&filter_name);
            if metaindex_iter.current_key() == Some(filter_name.as_slice()) {
                let handle_bytes = metaindex_iter.current_value().unwrap();
                let (location, _) = BlockHandle::decode(handle_bytes)?;
                if location.size() > 0 {
                    let contents = read_block_contents(&opt, &mut file, &location)?;
                    filters = Some(FilterBlockReader::new(policy.clone(), contents));
                }
            }
        }

        Ok(Table {
            file,
            opt,
            index_block,
            filters,
        })
    }

    /// Opens a table of internal keys, wrapping the comparator and filter policy the
    /// way `TableBuilder::new` does.
    pub fn new(mut opt: Options, file: R, size: usize) -> Result<Table<R>> {
        opt.cmp = Arc::new(Box::new(InternalKeyCmp(opt.cmp.clone())));
        if let Some(fp) = opt.filter_policy.take() {
            opt.filter_policy = Some(InternalFilterPolicy::new_wrap(fp));
        }
        Table::new_raw(opt, file, size)
    }

    fn read_block(&mut self, location: &BlockHandle) -> Result<Block> {
        let contents = read_block_contents(&self.opt, &mut self.file, location)?;
        Ok(Block::new(self.opt.clone(), contents))
    }

    /// Point lookup via index, filter and a single data block read. Returns the value
    /// stored under a key comparing equal to `key`, if any.
    pub fn get(&mut self, key: InternalKey) -> Result<Option<Vec<u8>>> {
        let mut index_iter = self.index_block.iter();
        index_iter.seek(key);

        // The index key is a separator at or above every key of its block; if the seek
        // ran off the end, key is past the table.
        let handle = match index_iter.current_value() {
            Some(handle_bytes) => BlockHandle::decode(handle_bytes)?.0,
            None => return Ok(None),
        };

        // The filter can prove absence without reading the block.
        if let Some(ref filters) = self.filters {
            if !filters.key_may_match(handle.offset(), key) {
                return Ok(None);
            }
        }

        let block = self.read_block(&handle)?;
        let mut block_iter = block.iter();
        block_iter.seek(key);

        if let Some(found) = block_iter.current_key() {
            if self.opt.cmp.cmp(found, key) == Ordering::Equal {
                return Ok(block_iter.current_value().map(|v| v.to_vec()));
            }
        }
        Ok(None)
    }

    /// A two-level iterator over the whole table. It reads from the file, so only one
    /// can be borrowed at a time.
    pub fn iter(&mut self) -> TableIterator<'_, R> {
        let index_iter = self.index_block.iter();
        TableIterator {
            table: self,
            index_iter,
            current_block: None,
            current_block_off: 0,
        }
    }
}

/// Iterates data blocks in index order, entries within each block. Corrupt blocks are
/// skipped when moving forward; moving backward stops on them.
pub struct TableIterator<'a, R: 'a + Read + Seek> {
    table: &'a mut Table<R>,
    index_iter: crate::block::BlockIter,
    current_block: Option<crate::block::BlockIter>,
    current_block_off: usize,
}

impl<'a, R: Read + Seek> TableIterator<'a, R> {
    /// The file offset of the block the iterator currently stands in.
    pub fn current_block_offset(&self) -> usize {
        self.current_block_off
    }

    // Loads the block the index iterator points at; leaves the block iterator
    // unpositioned.
    fn load_block(&mut self) -> Result<bool> {
        let handle = match self.index_iter.current_value() {
            Some(handle_bytes) => BlockHandle::decode(handle_bytes)?.0,
            None => return Ok(false),
        };
        let block = self.table.read_block(&handle)?;
        self.current_block = Some(block.iter());
        self.current_block_off = handle.offset();
        Ok(true)
    }

    // Enters the block under the index iterator at its first entry, skipping ahead
    // over unreadable or empty blocks.
    fn enter_block_front(&mut self) -> bool {
        loop {
            match self.load_block() {
                Ok(true) => {
                    let cb = self.current_block.as_mut().unwrap();
                    cb.seek_to_first();
                    if cb.valid() {
                        return true;
                    }
                }
                Ok(false) => {
                    self.current_block = None;
                    return false;
                }
                Err(_) => {}
            }
            if !self.index_iter.advance() {
                self.current_block = None;
                return false;
            }
        }
    }
}

impl<'a, R: Read + Seek> SsIterator for TableIterator<'a, R> {
    fn valid(&self) -> bool {
        self.current_block.as_ref().map_or(false, |cb| cb.valid())
    }

    fn seek_to_first(&mut self) {
        self.index_iter.seek_to_first();
        self.enter_block_front();
    }

    fn seek_to_last(&mut self) {
        self.index_iter.seek_to_last();
        match self.load_block() {
            Ok(true) => {
                let cb = self.current_block.as_mut().unwrap();
                cb.seek_to_last();
            }
            _ => self.current_block = None,
        }
    }

    fn seek(&mut self, to: &[u8]) {
        self.index_iter.seek(to);
        if !self.index_iter.valid() {
            // Past the last block.
            self.current_block = None;
            return;
        }
        match self.load_block() {
            Ok(true) => {
                let cb = self.current_block.as_mut().unwrap();
                cb.seek(to);
                if !cb.valid() {
                    // The separator admitted keys past the block's real last key; the
                    // answer is the first entry of the next block.
                    if self.index_iter.advance() {
                        self.enter_block_front();
                    } else {
                        self.current_block = None;
                    }
                }
            }
            _ => self.current_block = None,
        }
    }

    fn advance(&mut self) -> bool {
        match self.current_block.as_mut() {
            Some(cb) => {
                if cb.advance() {
                    return true;
                }
                if !self.index_iter.advance() {
                    self.current_block = None;
                    return false;
                }
                self.enter_block_front()
            }
            None => false,
        }
    }

    fn prev(&mut self) -> bool {
        match self.current_block.as_mut() {
            Some(cb) => {
                if cb.prev() {
                    return true;
                }
                // Step back one block and take its last entry.
                if !self.index_iter.prev() {
                    self.current_block = None;
                    return false;
                }
                match self.load_block() {
                    Ok(true) => {
                        let cb = self.current_block.as_mut().unwrap();
                        cb.seek_to_last();
                        cb.valid()
                    }
                    _ => {
                        self.current_block = None;
                        false
                    }
                }
            }
            None => false,
        }
    }

    fn current_key(&self) -> Option<&[u8]> {
        self.current_block.as_ref().and_then(|cb| cb.current_key())
    }

    fn current_value(&self) -> Option<&[u8]> {
        self.current_block.as_ref().and_then(|cb| cb.current_value())
    }
}
