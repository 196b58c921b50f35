use serde::{Deserialize, Serialize};
use strum::Display as StrumDisplay;

/// Default size of a freshly appended arena block.
pub(crate) const DEFAULT_BLOCK_SIZE: usize = 64 * 1024;

/// Allocation alignment inside a block.
const ALIGN: usize = 8;

/// Lifetime class an arena is tagged with.
///
/// The class does not change allocator behavior; it documents when the arena
/// is expected to be reset and lets debug output name the arena it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, StrumDisplay, Serialize, Deserialize)]
#[strum(serialize_all = "UPPERCASE")]
pub enum LifetimeClass {
    Auto,
    Forever,
    Module,
    Function,
    Thread,
}

/// A view into arena-owned bytes: block index, byte offset, length.
///
/// Views are plain indices, never pointers, so they stay valid across arena
/// growth and can be serialized with the arena they index into. A view is
/// only invalidated by [`Arena::reset`] or [`Arena::release_blocks`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub(crate) struct ArenaStr {
    block: u32,
    start: u32,
    len: u32,
}

impl ArenaStr {
    pub fn len(self) -> usize {
        self.len as usize
    }

    pub fn is_empty(self) -> bool {
        self.len == 0
    }

    /// A sub-view of this view, sharing the same block bytes.
    ///
    /// # Panics
    /// Panics when the requested range does not fit inside `self`.
    pub fn slice(self, start: usize, len: usize) -> Self {
        assert!(start + len <= self.len(), "arena sub-view out of range");
        Self {
            block: self.block,
            start: self.start + start as u32,
            len: len as u32,
        }
    }
}

/// Single-owner bump allocator.
///
/// Holds a vector of byte blocks; allocation appends to the current block,
/// aligning each request to 8 bytes, and rolls over to a fresh block of at
/// least `block_size` (or the request size) on overflow. All views handed out
/// remain valid until [`Arena::reset`] or destruction.
///
/// Per-object free is a no-op by contract: memory is reclaimed in bulk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Arena {
    blocks: Vec<Vec<u8>>,
    block_size: usize,
    lifetime: LifetimeClass,
}

impl Arena {
    pub fn new(block_size: usize, lifetime: LifetimeClass) -> Self {
        Self {
            blocks: Vec::new(),
            block_size: block_size.max(ALIGN),
            lifetime,
        }
    }

    pub fn with_lifetime(lifetime: LifetimeClass) -> Self {
        Self::new(DEFAULT_BLOCK_SIZE, lifetime)
    }

    pub fn lifetime(&self) -> LifetimeClass {
        self.lifetime
    }

    /// Copies `bytes` into the arena and returns a view of the copy.
    pub fn alloc_bytes(&mut self, bytes: &[u8]) -> ArenaStr {
        let need = bytes.len();
        let block = match self.usable_block(need) {
            Some(index) => index,
            None => {
                let capacity = self.block_size.max(need);
                self.blocks.push(Vec::with_capacity(capacity));
                self.blocks.len() - 1
            }
        };
        let storage = &mut self.blocks[block];
        // Pad the previous allocation up to the alignment boundary.
        let start = storage.len().next_multiple_of(ALIGN);
        storage.resize(start, 0);
        storage.extend_from_slice(bytes);
        ArenaStr {
            block: block as u32,
            start: start as u32,
            len: need as u32,
        }
    }

    /// Copies a string into the arena.
    pub fn alloc_str(&mut self, s: &str) -> ArenaStr {
        self.alloc_bytes(s.as_bytes())
    }

    fn usable_block(&self, need: usize) -> Option<usize> {
        let index = self.blocks.len().checked_sub(1)?;
        let storage = &self.blocks[index];
        let start = storage.len().next_multiple_of(ALIGN);
        (start + need <= storage.capacity()).then_some(index)
    }

    pub fn get(&self, view: ArenaStr) -> &[u8] {
        let start = view.start as usize;
        &self.blocks[view.block as usize][start..start + view.len()]
    }

    /// Resolves a view allocated via [`Arena::alloc_str`].
    ///
    /// # Panics
    /// Panics when the view does not cover valid UTF-8; views obtained from
    /// `alloc_str` (and sub-views on character boundaries) always do.
    pub fn get_str(&self, view: ArenaStr) -> &str {
        std::str::from_utf8(self.get(view)).expect("arena view should cover valid UTF-8")
    }

    /// Total bytes currently allocated across all blocks.
    pub fn used(&self) -> usize {
        self.blocks.iter().map(Vec::len).sum()
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Rewinds every block to empty without releasing its storage.
    ///
    /// All outstanding views become invalid.
    pub fn reset(&mut self) {
        for block in &mut self.blocks {
            block.clear();
        }
    }

    /// Releases all block storage back to the allocator.
    pub fn release_blocks(&mut self) {
        self.blocks.clear();
        self.blocks.shrink_to_fit();
    }

    /// Freeing a single view is a no-op by contract.
    pub fn free(&self, _view: ArenaStr) {}

    /// Serializes the arena (blocks, block size, lifetime class) for
    /// snapshot tests.
    pub fn save(&self) -> Vec<u8> {
        postcard::to_allocvec(self).expect("arena serialization should not fail")
    }

    /// Restores an arena from a [`Arena::save`] snapshot.
    pub fn load(bytes: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(bytes)
    }
}
