//! Pages: the unit of columnar exchange between operators.

use std::fmt;

use omnivec_common::error::{check_readable_position, check_valid_region};
use omnivec_common::{Error, Result};

use crate::block::{Block, block_from_vector};
use crate::runtime::VecBatch;

/// An ordered set of blocks sharing one position count.
///
/// A page with no blocks still has a position count: aggregations with no
/// aggregate functions emit one row and zero columns.
#[derive(Debug)]
pub struct Page {
    blocks: Vec<Box<dyn Block>>,
    position_count: usize,
}

impl Page {
    /// Creates a page from at least one block.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `blocks` is empty or the blocks
    /// disagree on position count.
    pub fn new(blocks: Vec<Box<dyn Block>>) -> Result<Self> {
        let Some(first) = blocks.first() else {
            return Err(Error::invalid_argument(
                "a page needs at least one block or an explicit position count",
            ));
        };
        let position_count = first.position_count();
        Self::with_position_count(position_count, blocks)
    }

    /// Creates a page with an explicit position count.
    pub fn with_position_count(position_count: usize, blocks: Vec<Box<dyn Block>>) -> Result<Self> {
        if let Some((channel, block)) = blocks
            .iter()
            .enumerate()
            .find(|(_, b)| b.position_count() != position_count)
        {
            return Err(Error::invalid_argument(format!(
                "block {channel} has {} positions, page has {position_count}",
                block.position_count()
            )));
        }
        Ok(Self {
            blocks,
            position_count,
        })
    }

    /// Number of rows.
    #[must_use]
    pub fn position_count(&self) -> usize {
        self.position_count
    }

    /// Number of columns.
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.blocks.len()
    }

    /// The block of `channel`.
    pub fn block(&self, channel: usize) -> Result<&dyn Block> {
        check_readable_position(channel, self.blocks.len())?;
        Ok(self.blocks[channel].as_ref())
    }

    /// All blocks in channel order.
    #[must_use]
    pub fn blocks(&self) -> &[Box<dyn Block>] {
        &self.blocks
    }

    /// Logical size of all blocks.
    #[must_use]
    pub fn size_in_bytes(&self) -> u64 {
        self.blocks.iter().map(|b| b.size_in_bytes()).sum()
    }

    /// Retained size of all blocks.
    #[must_use]
    pub fn retained_size_in_bytes(&self) -> u64 {
        self.blocks.iter().map(|b| b.retained_size_in_bytes()).sum()
    }

    /// Views of `[offset, offset + length)` of every block.
    pub fn get_region(&self, offset: usize, length: usize) -> Result<Page> {
        check_valid_region(self.position_count, offset, length)?;
        let blocks = self
            .blocks
            .iter()
            .map(|b| b.get_region(offset, length))
            .collect::<Result<Vec<_>>>()?;
        Page::with_position_count(length, blocks)
    }

    /// Gathers `positions[offset..offset + length]` from every block.
    pub fn copy_positions(&self, positions: &[usize], offset: usize, length: usize) -> Result<Page> {
        omnivec_common::error::check_array_range(positions.len(), offset, length)?;
        let blocks = self
            .blocks
            .iter()
            .map(|b| b.copy_positions(positions, offset, length))
            .collect::<Result<Vec<_>>>()?;
        Page::with_position_count(length, blocks)
    }

    /// A fresh one-row page holding `position`.
    pub fn single_value_page(&self, position: usize) -> Result<Page> {
        check_readable_position(position, self.position_count)?;
        let blocks = self
            .blocks
            .iter()
            .map(|b| b.get_single_value_block(position))
            .collect::<Result<Vec<_>>>()?;
        Page::with_position_count(1, blocks)
    }

    /// Moves every block's vector into a batch for the native side.
    pub fn into_vec_batch(self) -> Result<VecBatch> {
        let vectors = self
            .blocks
            .into_iter()
            .map(|b| b.into_vector())
            .collect::<Result<Vec<_>>>()?;
        Ok(VecBatch::new(vectors, self.position_count))
    }

    /// Wraps a native batch back into blocks.
    pub fn from_vec_batch(batch: VecBatch) -> Result<Page> {
        let row_count = batch.row_count();
        let blocks = batch
            .into_vectors()
            .into_iter()
            .map(|v| block_from_vector(v, row_count))
            .collect::<Result<Vec<_>>>()?;
        Page::with_position_count(row_count, blocks)
    }

    /// Closes every block. All blocks are closed even if one fails; the first
    /// error is returned.
    pub fn close(&mut self) -> Result<()> {
        let mut first_error = None;
        for block in &mut self.blocks {
            if let Err(e) = block.close() {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Takes the blocks out of the page.
    #[must_use]
    pub fn into_blocks(self) -> Vec<Box<dyn Block>> {
        self.blocks
    }
}

impl fmt::Display for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Page{{positions={}, channels={}}}",
            self.position_count,
            self.blocks.len()
        )
    }
}
