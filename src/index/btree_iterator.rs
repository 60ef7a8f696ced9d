use std::sync::Arc;

use crate::buffer::{BufferPoolManager, ReadPageGuard};
use crate::common::Result;

use super::btree_page::LeafPageView;

/// Ascending-order cursor over a leaf chain. Holds a single read latch at a
/// time, re-fetching the next leaf only once the current one is exhausted,
/// so concurrent inserts elsewhere in the tree are never blocked by a long
/// scan sitting on more than one page.
pub struct BTreeIterator<const KEY_SIZE: usize, const VALUE_SIZE: usize> {
    bpm: Option<Arc<BufferPoolManager>>,
    current: Option<ReadPageGuard>,
    index: usize,
}

impl<const KEY_SIZE: usize, const VALUE_SIZE: usize> BTreeIterator<KEY_SIZE, VALUE_SIZE> {
    pub(crate) fn new(bpm: Arc<BufferPoolManager>, leaf_guard: ReadPageGuard, index: usize) -> Self {
        Self {
            bpm: Some(bpm),
            current: Some(leaf_guard),
            index,
        }
    }

    /// An iterator that yields nothing, for an empty tree or a search past
    /// the last key.
    pub(crate) fn empty() -> Self {
        Self {
            bpm: None,
            current: None,
            index: 0,
        }
    }

    pub fn is_end(&self) -> bool {
        self.current.is_none()
    }

    fn advance(&mut self) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        loop {
            let Some(guard) = self.current.as_ref() else {
                return Ok(None);
            };
            let view = LeafPageView::<KEY_SIZE, VALUE_SIZE>::new(guard.data());

            if self.index < view.size() as usize {
                let key = view.key_at(self.index).to_vec();
                let value = view.value_at(self.index).to_vec();
                self.index += 1;
                return Ok(Some((key, value)));
            }

            let next_page_id = view.next_page_id();
            if !next_page_id.is_valid() {
                self.current = None;
                return Ok(None);
            }

            self.current = Some(
                self.bpm
                    .as_ref()
                    .expect("a non-empty current guard always has a bpm")
                    .fetch_read(next_page_id)?,
            );
            self.index = 0;
        }
    }
}

impl<const KEY_SIZE: usize, const VALUE_SIZE: usize> Iterator for BTreeIterator<KEY_SIZE, VALUE_SIZE> {
    type Item = Result<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        self.advance().transpose()
    }
}
