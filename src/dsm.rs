//! DSM reassembly.
//!
//! DSM messages are broadcast in 13-byte blocks, one per HKROOT message, and
//! reassembled here across sub-frames. One buffer is kept per DSM ID; each
//! satellite may broadcast different blocks in sync, so blocks from all
//! satellites feed the same buffers.

use crate::bitfields::{DsmHeader, DsmType};
use crate::types::{DsmBlock, DSM_BLOCK_BYTES};
use crate::Gst;

const MAX_DSM_BLOCKS: usize = 16;
const NUM_DSM_IDS: usize = 16;

// A buffer with no progress for this long is considered stale (one chain
// period of 16 sub-frames).
const STALE_SUBFRAMES: u64 = 16;

/// Outcome of feeding a DSM block.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum DsmFeed<'a> {
    /// The DSM for this ID is not complete yet.
    Incomplete,
    /// The DSM has just been completed.
    Complete {
        /// DSM ID of the completed message.
        dsm_id: u8,
        /// Type of the completed message.
        dsm_type: DsmType,
        /// Reassembled message contents.
        data: &'a [u8],
    },
    /// The in-progress buffer for this ID was inconsistent with the received
    /// block (differing content or block count) and has been discarded. The
    /// received block starts a fresh buffer.
    Discarded {
        /// DSM ID of the discarded buffer.
        dsm_id: u8,
    },
}

#[derive(Debug, Clone, Eq, PartialEq)]
struct Buffer {
    data: [u8; MAX_DSM_BLOCKS * DSM_BLOCK_BYTES],
    block_valid: [bool; MAX_DSM_BLOCKS],
    done: bool,
    last_progress: Gst,
}

impl Buffer {
    fn new(gst: Gst) -> Buffer {
        Buffer {
            data: [0; MAX_DSM_BLOCKS * DSM_BLOCK_BYTES],
            block_valid: [false; MAX_DSM_BLOCKS],
            done: false,
            last_progress: gst,
        }
    }

    fn block(&self, block_id: usize) -> &[u8] {
        &self.data[block_id * DSM_BLOCK_BYTES..(block_id + 1) * DSM_BLOCK_BYTES]
    }

    fn store_block(&mut self, block_id: usize, block: &DsmBlock, gst: Gst) {
        self.data[block_id * DSM_BLOCK_BYTES..(block_id + 1) * DSM_BLOCK_BYTES]
            .copy_from_slice(block);
        self.block_valid[block_id] = true;
        self.last_progress = gst;
    }

    // Number of blocks from the NB field in block 0, or None if block 0 has
    // not arrived or NB holds a reserved value.
    fn number_of_blocks(&self, dsm_type: DsmType) -> Option<usize> {
        if !self.block_valid[0] {
            return None;
        }
        let nb = self.data[0] >> 4;
        match dsm_type {
            DsmType::Kroot => match nb {
                1..=8 => Some(usize::from(nb) + 6),
                _ => None, // reserved value
            },
            DsmType::Pkr => match nb {
                7..=10 => Some(usize::from(nb) + 6),
                _ => None, // reserved value
            },
        }
    }

    fn complete_size(&self, dsm_type: DsmType) -> Option<usize> {
        let n = self.number_of_blocks(dsm_type)?;
        if self.block_valid[..n].iter().all(|&v| v) {
            Some(n * DSM_BLOCK_BYTES)
        } else {
            None
        }
    }
}

/// DSM reassembly buffers.
#[derive(Debug, Clone, Default)]
pub struct CollectDsm {
    buffers: [Option<Buffer>; NUM_DSM_IDS],
}

impl CollectDsm {
    /// Creates an empty set of reassembly buffers.
    pub fn new() -> CollectDsm {
        CollectDsm::default()
    }

    /// Feeds one DSM block received at sub-frame epoch `gst`.
    ///
    /// Re-broadcast blocks of an already completed DSM are ignored, so a
    /// completed message is reported exactly once. A received block that
    /// differs from the stored copy of the same block ID discards the buffer
    /// and starts over from the received block.
    pub fn feed(&mut self, header: DsmHeader, block: &DsmBlock, gst: Gst) -> DsmFeed<'_> {
        let dsm_id = header.dsm_id();
        let dsm_type = header.dsm_type();
        let block_id = usize::from(header.dsm_block_id());
        let idx = usize::from(dsm_id);
        log::trace!("feeding header = {:?}, block = {:02x?}", header, block);

        self.discard_stale(gst);

        let buffer = self.buffers[idx].get_or_insert_with(|| {
            log::info!("starting reassembly of DSM id = {}", dsm_id);
            Buffer::new(gst)
        });

        if buffer.block_valid[block_id] {
            if buffer.block(block_id) != block {
                log::warn!(
                    "block {} of DSM id = {} differs from stored copy. discarding buffer",
                    block_id,
                    dsm_id
                );
                let mut fresh = Buffer::new(gst);
                fresh.store_block(block_id, block, gst);
                self.buffers[idx] = Some(fresh);
                return DsmFeed::Discarded { dsm_id };
            }
            // Identical re-broadcast: nothing to do, complete or not
            return DsmFeed::Incomplete;
        }

        if buffer.done {
            // New block for a completed DSM: the content changed, start over
            log::info!("new block for completed DSM id = {}. restarting", dsm_id);
            let mut fresh = Buffer::new(gst);
            fresh.store_block(block_id, block, gst);
            self.buffers[idx] = Some(fresh);
            return DsmFeed::Discarded { dsm_id };
        }

        buffer.store_block(block_id, block, gst);
        if let Some(size) = buffer.complete_size(dsm_type) {
            buffer.done = true;
            log::info!("completed DSM with id = {}, size = {} bytes", dsm_id, size);
            let data = &self.buffers[idx].as_ref().unwrap().data[..size];
            log::trace!("DSM contents {:02x?}", data);
            return DsmFeed::Complete {
                dsm_id,
                dsm_type,
                data,
            };
        }
        DsmFeed::Incomplete
    }

    // Frees incomplete buffers with no progress for longer than one chain
    // period.
    fn discard_stale(&mut self, now: Gst) {
        for (id, slot) in self.buffers.iter_mut().enumerate() {
            if let Some(buffer) = slot {
                if !buffer.done
                    && now.timestamp().saturating_sub(buffer.last_progress.timestamp())
                        > STALE_SUBFRAMES * 30
                {
                    log::info!("discarding stale DSM buffer id = {}", id);
                    *slot = None;
                }
            }
        }
    }
}
