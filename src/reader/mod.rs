mod cache;

use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::error::{GenError, GenResult};

use cache::BlockCache;

pub const DEFAULT_CACHE_SIZE: usize = 1 << 28;
pub const DEFAULT_BLOCK_SIZE: usize = 1 << 20;

/// Circular, bounded-memory cursor over a UTF-8 text corpus.
///
/// The corpus is indexed once at open time in blocks of `block_size` code
/// points. Blocks are decoded lazily and kept in an LRU cache holding at most
/// `cache_size / block_size` blocks.
pub struct TextReader {
    path: PathBuf,
    file: File,
    offsets: Vec<u64>,
    end: u64,
    length: usize,
    block_size: usize,
    cache: BlockCache,
    idx: usize,
}

impl TextReader {
    pub fn open(path: &Path, cache_size: usize, block_size: usize) -> GenResult<Self> {
        if block_size == 0 {
            return Err(GenError::invalid("block size must be positive"));
        }
        let mut file = File::open(path).map_err(|err| GenError::io(path, err))?;
        let (offsets, end, length) = scan_blocks(path, &mut file, block_size)?;
        let bucket_size = cache_size / block_size;
        debug!(
            "opened corpus {} ({} chars, {} blocks, {} cached blocks max)",
            path.display(),
            length,
            offsets.len(),
            bucket_size.max(1)
        );
        Ok(Self {
            path: path.to_path_buf(),
            file,
            offsets,
            end,
            length,
            block_size,
            cache: BlockCache::new(bucket_size),
            idx: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn position(&self) -> usize {
        self.idx
    }

    /// Byte offset at which every block starts.
    pub fn offsets(&self) -> &[u64] {
        if self.length == 0 {
            return &[];
        }
        &self.offsets
    }

    pub fn bucket_size(&self) -> usize {
        self.cache.capacity()
    }

    /// Cached block indices, least recently used first.
    pub fn cached_blocks(&self) -> Vec<usize> {
        self.cache.keys()
    }

    pub fn seek(&mut self, idx: usize) -> GenResult<()> {
        self.ensure_readable("seek")?;
        self.idx = idx % self.length;
        Ok(())
    }

    pub fn advance(&mut self) -> GenResult<()> {
        self.ensure_readable("advance")?;
        self.idx = (self.idx + 1) % self.length;
        Ok(())
    }

    pub fn retreat(&mut self) -> GenResult<()> {
        self.ensure_readable("retreat")?;
        self.idx = (self.idx + self.length - 1) % self.length;
        Ok(())
    }

    /// Moves the cursor back by `count` positions, wrapping around.
    pub fn rewind(&mut self, count: usize) -> GenResult<()> {
        self.ensure_readable("rewind")?;
        let count = count % self.length;
        self.idx = (self.idx + self.length - count) % self.length;
        Ok(())
    }

    pub fn peek(&mut self) -> GenResult<char> {
        self.ensure_readable("peek")?;
        let key = self.idx / self.block_size;
        let within = self.idx % self.block_size;
        let block = self.block(key)?;
        block.get(within).copied().ok_or_else(|| {
            GenError::invalid(format!(
                "position {} is outside block {} ({} chars)",
                self.idx,
                key,
                block.len()
            ))
        })
    }

    /// Returns the character under the cursor and moves past it.
    pub fn read_char(&mut self) -> GenResult<char> {
        let ch = self.peek()?;
        self.advance()?;
        Ok(ch)
    }

    fn ensure_readable(&self, op: &str) -> GenResult<()> {
        if self.length == 0 {
            return Err(GenError::invalid(format!(
                "cannot {} an empty corpus: {}",
                op,
                self.path.display()
            )));
        }
        Ok(())
    }

    fn block(&mut self, key: usize) -> GenResult<Arc<[char]>> {
        if let Some(block) = self.cache.get(key) {
            return Ok(block);
        }
        let block = self.load_block(key)?;
        if let Some(evicted) = self.cache.insert(key, Arc::clone(&block)) {
            debug!("evicted corpus block {}", evicted);
        }
        Ok(block)
    }

    fn load_block(&mut self, key: usize) -> GenResult<Arc<[char]>> {
        let start = *self
            .offsets
            .get(key)
            .ok_or_else(|| GenError::invalid(format!("block {} is out of range", key)))?;
        let end = self.offsets.get(key + 1).copied().unwrap_or(self.end);
        let mut bytes = vec![0u8; (end - start) as usize];
        self.file
            .seek(SeekFrom::Start(start))
            .and_then(|_| self.file.read_exact(&mut bytes))
            .map_err(|err| GenError::io(&self.path, err))?;
        let text =
            String::from_utf8(bytes).map_err(|err| GenError::Decode {
                block: key,
                source: err.utf8_error(),
            })?;
        Ok(text.chars().collect::<Vec<_>>().into())
    }
}

/// Indexes block offsets and validates the whole corpus as UTF-8, so a bad
/// byte fails at open time rather than on a later random seek.
fn scan_blocks(
    path: &Path,
    file: &mut File,
    block_size: usize,
) -> GenResult<(Vec<u64>, u64, usize)> {
    let mut reader = BufReader::new(file);
    let mut offsets = vec![0u64];
    let mut length = 0usize;
    let mut position = 0u64;
    // bytes of a code point split across two reads
    let mut pending: Vec<u8> = Vec::new();
    loop {
        let buf = reader.fill_buf().map_err(|err| GenError::io(path, err))?;
        if buf.is_empty() {
            break;
        }
        pending.extend_from_slice(buf);
        let consumed = buf.len();
        reader.consume(consumed);

        let (valid, invalid) = match std::str::from_utf8(&pending) {
            Ok(text) => (text.len(), None),
            Err(err) => (err.valid_up_to(), err.error_len().map(|_| err)),
        };
        for &byte in &pending[..valid] {
            // continuation bytes never start a code point
            if byte & 0xC0 != 0x80 {
                if length > 0 && length % block_size == 0 {
                    offsets.push(position);
                }
                length += 1;
            }
            position += 1;
        }
        if let Some(source) = invalid {
            return Err(GenError::Decode {
                block: length / block_size,
                source,
            });
        }
        pending.drain(..valid);
    }
    if let Err(source) = std::str::from_utf8(&pending) {
        return Err(GenError::Decode {
            block: length / block_size,
            source,
        });
    }
    Ok((offsets, position, length))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{corpus_bytes, corpus_file as corpus};

    #[test]
    fn indexes_blocks_and_wraps_at_end() {
        let file = corpus("abcdefghij");
        let mut reader = TextReader::open(file.path(), 1 << 10, 4).expect("open");
        assert_eq!(reader.len(), 10);
        assert_eq!(reader.offsets(), &[0, 4, 8]);

        reader.seek(9).expect("seek");
        assert_eq!(reader.peek().expect("peek"), 'j');
        reader.advance().expect("advance");
        assert_eq!(reader.position(), 0);
        assert_eq!(reader.peek().expect("peek"), 'a');
    }

    #[test]
    fn full_cycle_matches_linear_scan() {
        let text = "가나다라 마바사\n아자차카 타파하!";
        let file = corpus(text);
        let mut reader = TextReader::open(file.path(), 6, 3).expect("open");
        let expected: Vec<char> = text.chars().collect();
        assert_eq!(reader.len(), expected.len());

        reader.seek(5).expect("seek");
        for step in 0..expected.len() {
            let idx = (5 + step) % expected.len();
            assert_eq!(reader.read_char().expect("read"), expected[idx]);
            assert!(reader.cached_blocks().len() <= reader.bucket_size());
        }
        assert_eq!(reader.position(), 5);
    }

    #[test]
    fn multibyte_block_offsets_are_byte_positions() {
        let file = corpus("한글abc");
        let mut reader = TextReader::open(file.path(), 16, 2).expect("open");
        assert_eq!(reader.offsets(), &[0, 6, 8]);
        reader.seek(4).expect("seek");
        assert_eq!(reader.peek().expect("peek"), 'c');
        reader.seek(1).expect("seek");
        assert_eq!(reader.peek().expect("peek"), '글');
    }

    #[test]
    fn block_accesses_follow_lru_order() {
        let file = corpus("abcdefghij");
        let mut reader = TextReader::open(file.path(), 8, 4).expect("open");
        assert_eq!(reader.bucket_size(), 2);
        for idx in [0, 4, 8, 0] {
            reader.seek(idx).expect("seek");
            reader.peek().expect("peek");
        }
        assert_eq!(reader.cached_blocks(), vec![2, 0]);
    }

    #[test]
    fn retreat_and_rewind_wrap_backwards() {
        let file = corpus("abcde");
        let mut reader = TextReader::open(file.path(), 64, 2).expect("open");
        reader.retreat().expect("retreat");
        assert_eq!(reader.peek().expect("peek"), 'e');
        reader.rewind(7).expect("rewind");
        assert_eq!(reader.position(), 2);
        reader.seek(12).expect("seek");
        assert_eq!(reader.position(), 2);
    }

    #[test]
    fn short_corpus_is_a_single_block() {
        let file = corpus("xyz");
        let mut reader = TextReader::open(file.path(), 1 << 20, 1 << 10).expect("open");
        assert_eq!(reader.offsets(), &[0]);
        reader.seek(2).expect("seek");
        assert_eq!(reader.peek().expect("peek"), 'z');
    }

    #[test]
    fn empty_corpus_rejects_cursor_operations() {
        let file = corpus("");
        let mut reader = TextReader::open(file.path(), 64, 4).expect("open");
        assert!(reader.is_empty());
        assert!(matches!(reader.seek(0), Err(GenError::InvalidArgument(_))));
        assert!(matches!(reader.advance(), Err(GenError::InvalidArgument(_))));
        assert!(matches!(reader.peek(), Err(GenError::InvalidArgument(_))));
    }

    #[test]
    fn invalid_utf8_fails_at_open() {
        let file = corpus_bytes(b"abc\xffdef");
        let result = TextReader::open(file.path(), 64, 4);
        assert!(matches!(result, Err(GenError::Decode { block: 0, .. })));

        let file = corpus_bytes(&"가나다".as_bytes()[..8]);
        let result = TextReader::open(file.path(), 64, 4);
        assert!(matches!(result, Err(GenError::Decode { .. })));
    }

    #[test]
    fn code_points_split_across_reads_are_counted_once() {
        // 1 + 3 * 5000 bytes puts the 8 KiB read boundary inside a syllable
        let text = format!("a{}", "가".repeat(5000));
        let file = corpus(&text);
        let mut reader = TextReader::open(file.path(), 1 << 16, 1024).expect("open");
        assert_eq!(reader.len(), 5001);
        reader.seek(5000).expect("seek");
        assert_eq!(reader.peek().expect("peek"), '가');
    }

    #[test]
    fn missing_corpus_is_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let result = TextReader::open(&dir.path().join("missing.txt"), 64, 4);
        assert!(matches!(result, Err(GenError::Io { .. })));
    }
}
