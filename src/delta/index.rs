// Block index over the base buffer.
//
// The base is cut into blocks that end after a line feed or at `max_block`
// bytes. Every block is stored in a hash-chained table keyed by its exact
// content: `heads[bucket]` holds the first block of a chain and
// `next[block]` links to the following one. Collisions are kept, never
// overwritten, and lookups compare content byte-for-byte.
//
// Both arrays store `block + 1` so that 0 means "empty".

/// End (exclusive) of the block starting at `start`.
#[inline]
pub fn block_end(data: &[u8], start: usize, max_block: usize) -> usize {
    let limit = data.len().min(start + max_block.max(1));
    match data[start..limit].iter().position(|&b| b == b'\n') {
        Some(lf) => start + lf + 1,
        None => limit,
    }
}

#[inline]
fn block_hash(block: &[u8]) -> u32 {
    // FNV-1a
    let mut hash: u32 = 0x811C_9DC5;
    for &byte in block {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

/// Multi-value index from block content to every base offset holding it.
pub struct BlockIndex<'a> {
    base: &'a [u8],
    /// `(start, len)` of each indexed block, in base order.
    blocks: Vec<(u32, u32)>,
    heads: Vec<u32>,
    next: Vec<u32>,
    mask: usize,
}

impl<'a> BlockIndex<'a> {
    pub fn new(base: &'a [u8], max_block: usize) -> Self {
        let mut blocks = Vec::new();
        let mut start = 0;
        while start < base.len() {
            let end = block_end(base, start, max_block);
            // Copy offsets are 32-bit; blocks beyond that are not indexed.
            let (Ok(offset), Ok(len)) = (u32::try_from(start), u32::try_from(end - start)) else {
                break;
            };
            blocks.push((offset, len));
            start = end;
        }

        let size = blocks.len().next_power_of_two().max(16);
        let mut index = Self {
            base,
            heads: vec![0; size],
            next: vec![0; blocks.len()],
            mask: size - 1,
            blocks,
        };
        // Insert back to front so each chain yields offsets in ascending order.
        for block in (0..index.blocks.len()).rev() {
            let bucket = index.bucket(index.block(block));
            index.next[block] = index.heads[bucket];
            index.heads[bucket] = block as u32 + 1;
        }
        index
    }

    #[inline]
    fn bucket(&self, content: &[u8]) -> usize {
        block_hash(content) as usize & self.mask
    }

    #[inline]
    fn block(&self, block: usize) -> &'a [u8] {
        let (start, len) = self.blocks[block];
        let start = start as usize;
        &self.base[start..start + len as usize]
    }

    /// Number of indexed blocks.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Base offsets of every block whose content equals `content`, ascending.
    pub fn candidates<'s>(&'s self, content: &'s [u8]) -> impl Iterator<Item = usize> + 's {
        let mut cursor = self.heads[self.bucket(content)];
        std::iter::from_fn(move || {
            while cursor != 0 {
                let block = (cursor - 1) as usize;
                cursor = self.next[block];
                if self.block(block) == content {
                    return Some(self.blocks[block].0 as usize);
                }
            }
            None
        })
    }
}
