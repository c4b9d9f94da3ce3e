//! Signal blocks: mutually exclusive occupancy zones over track segments.
//!
//! Segments of the same color that share an endpoint always belong to one
//! block. [`SignalBlocks::add`] unions every block the new segment touches;
//! [`SignalBlocks::remove`] takes the segment out and re-adds the rest one
//! at a time, which splits the block wherever it fell apart.
//!
//! A vehicle entering any segment of a block claims every segment of that
//! block for the next horizon, so two vehicles never share a block.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::error::{SimError, SimResult};
use crate::occupancy::OccupancyMap;
use crate::record::{segment_from_record, segment_to_record, Persist, Record};
use crate::types::{BlockId, SegmentKey, VehicleId};

/// Counter value of a block claimed this tick.
const FRESHLY_OCCUPIED: u8 = 2;

/// Color classification of a signal block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockColor {
    White,
    Orange,
    Magenta,
    LightBlue,
    Yellow,
    Lime,
    Pink,
    Gray,
    LightGray,
    Cyan,
    Purple,
    Blue,
    Brown,
    Green,
    #[default]
    Red,
    Black,
}

impl BlockColor {
    pub const ALL: [BlockColor; 16] = [
        BlockColor::White,
        BlockColor::Orange,
        BlockColor::Magenta,
        BlockColor::LightBlue,
        BlockColor::Yellow,
        BlockColor::Lime,
        BlockColor::Pink,
        BlockColor::Gray,
        BlockColor::LightGray,
        BlockColor::Cyan,
        BlockColor::Purple,
        BlockColor::Blue,
        BlockColor::Brown,
        BlockColor::Green,
        BlockColor::Red,
        BlockColor::Black,
    ];

    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

/// A maximal set of connected same-color segments.
#[derive(Clone, Debug, PartialEq)]
pub struct SignalBlock {
    pub id: BlockId,
    pub color: BlockColor,
    segments: BTreeSet<SegmentKey>,
    occupied: u8,
}

impl SignalBlock {
    fn new(id: BlockId, color: BlockColor, segment: SegmentKey) -> Self {
        Self {
            id,
            color,
            segments: BTreeSet::from([segment]),
            occupied: 0,
        }
    }

    pub fn segments(&self) -> &BTreeSet<SegmentKey> {
        &self.segments
    }

    pub fn is_occupied(&self) -> bool {
        self.occupied > 0
    }

    fn is_connected(&self, segment: &SegmentKey) -> bool {
        self.segments.iter().any(|existing| existing.shares_endpoint(segment))
    }
}

/// Owner of every signal block in a world.
#[derive(Clone, Debug, Default)]
pub struct SignalBlocks {
    blocks: Vec<SignalBlock>,
    segment_index: HashMap<SegmentKey, BTreeSet<BlockId>>,
    next_id: BlockId,
}

impl SignalBlocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn blocks(&self) -> &[SignalBlock] {
        &self.blocks
    }

    pub fn get(&self, id: BlockId) -> Option<&SignalBlock> {
        self.blocks.iter().find(|block| block.id == id)
    }

    /// Adds a segment to the blocks of `color`, merging every block it
    /// connects. Returns the id of the block now holding the segment.
    pub fn add(&mut self, color: BlockColor, segment: SegmentKey) -> BlockId {
        self.insert(color, segment, None)
    }

    /// Removes a segment from its block of `color`. Returns false if no
    /// block of that color holds the segment.
    pub fn remove(&mut self, color: BlockColor, segment: SegmentKey) -> bool {
        let Some(position) = self
            .blocks
            .iter()
            .position(|block| block.color == color && block.segments.contains(&segment))
        else {
            return false;
        };

        let block = self.blocks.remove(position);
        let mut remaining = block.segments.into_iter().filter(|existing| *existing != segment);

        match remaining.next() {
            Some(first) => {
                self.insert(color, first, Some(block.id));
                for existing in remaining {
                    self.insert(color, existing, None);
                }
            }
            None => self.rebuild_index(),
        }
        true
    }

    fn insert(&mut self, color: BlockColor, segment: SegmentKey, id: Option<BlockId>) -> BlockId {
        let mut connected: Vec<BlockId> = self
            .blocks
            .iter()
            .filter(|block| block.color == color && block.is_connected(&segment))
            .map(|block| block.id)
            .collect();
        connected.sort_unstable();

        let target_id = match connected.split_first() {
            None => {
                let id = id.unwrap_or_else(|| self.allocate_id());
                self.next_id = self.next_id.max(id + 1);
                self.blocks.push(SignalBlock::new(id, color, segment));
                id
            }
            Some((&target_id, absorbed)) => {
                let absorbed: HashSet<BlockId> = absorbed.iter().copied().collect();
                let mut merged = BTreeSet::from([segment]);
                let mut occupied = 0;
                for block in self.blocks.iter().filter(|block| absorbed.contains(&block.id)) {
                    merged.extend(block.segments.iter().copied());
                    occupied = occupied.max(block.occupied);
                }
                self.blocks.retain(|block| !absorbed.contains(&block.id));
                if let Some(target) = self.blocks.iter_mut().find(|block| block.id == target_id) {
                    target.segments.extend(merged);
                    target.occupied = target.occupied.max(occupied);
                }
                target_id
            }
        };

        self.rebuild_index();
        debug_assert!(self.check_invariant().is_ok());
        target_id
    }

    fn allocate_id(&mut self) -> BlockId {
        let taken: HashSet<BlockId> = self.blocks.iter().map(|block| block.id).collect();
        let mut id = self.next_id.max(1);
        while taken.contains(&id) {
            id += 1;
        }
        self.next_id = id + 1;
        id
    }

    fn rebuild_index(&mut self) {
        self.segment_index.clear();
        for block in &self.blocks {
            for segment in &block.segments {
                self.segment_index.entry(*segment).or_default().insert(block.id);
            }
        }
    }

    /// Returns true if at least one block covers the segment.
    pub fn covers(&self, segment: &SegmentKey) -> bool {
        self.segment_index.contains_key(segment)
    }

    fn covering(&self, segment: &SegmentKey) -> impl Iterator<Item = &SignalBlock> {
        let ids = self.segment_index.get(segment);
        self.blocks
            .iter()
            .filter(move |block| ids.map_or(false, |ids| ids.contains(&block.id)))
    }

    /// Claims the segment and every segment sharing a block with it for
    /// `vehicle` in the next horizon (`maps[1]`).
    ///
    /// Returns false without any effect if fewer than two horizons are
    /// given, or if another vehicle holds any of those segments in any
    /// horizon.
    pub fn occupy(&mut self, segment: SegmentKey, maps: &mut [OccupancyMap], vehicle: VehicleId) -> bool {
        if maps.len() < 2 {
            return false;
        }

        let mut to_claim = BTreeSet::from([segment]);
        for block in self.covering(&segment) {
            to_claim.extend(block.segments.iter().copied());
        }

        let taken = maps
            .iter()
            .any(|map| to_claim.iter().any(|key| map.is_held_by_other(key, vehicle)));
        if taken {
            tracing::debug!(vehicle, %segment, "Signal block occupancy rejected");
            return false;
        }

        for key in &to_claim {
            maps[1].claim_whole(*key, vehicle);
        }
        if let Some(ids) = self.segment_index.get(&segment) {
            for block in self.blocks.iter_mut().filter(|block| ids.contains(&block.id)) {
                block.occupied = FRESHLY_OCCUPIED;
            }
        }
        true
    }

    /// Decays every block's occupancy counter by one. Called once per tick.
    pub fn reset_occupied(&mut self) {
        for block in &mut self.blocks {
            block.occupied = block.occupied.saturating_sub(1);
        }
    }

    /// Blocks covering a segment, ordered by color.
    pub fn blocks_at(&self, segment: &SegmentKey) -> Vec<&SignalBlock> {
        let mut blocks: Vec<&SignalBlock> = self.covering(segment).collect();
        blocks.sort_by_key(|block| block.color);
        blocks
    }

    /// Returns true if any block covering the segment is held.
    pub fn is_occupied(&self, segment: &SegmentKey) -> bool {
        self.covering(segment).any(SignalBlock::is_occupied)
    }

    /// Occupancy of every block, for display.
    pub fn status(&self) -> BTreeMap<BlockId, bool> {
        self.blocks
            .iter()
            .map(|block| (block.id, block.is_occupied()))
            .collect()
    }

    /// Occupancy of the blocks covering one segment, merged into `status`.
    pub fn status_at(&self, segment: &SegmentKey, status: &mut BTreeMap<BlockId, bool>) {
        for block in self.covering(segment) {
            status.insert(block.id, block.is_occupied());
        }
    }

    /// Applies a status map received from elsewhere.
    pub fn write_status(&mut self, status: &BTreeMap<BlockId, bool>) {
        for block in &mut self.blocks {
            if let Some(&occupied) = status.get(&block.id) {
                block.occupied = if occupied { FRESHLY_OCCUPIED } else { 0 };
            }
        }
    }

    /// Verifies that no two same-color blocks share an endpoint.
    pub fn check_invariant(&self) -> SimResult<()> {
        for (i, first) in self.blocks.iter().enumerate() {
            for second in &self.blocks[i + 1..] {
                if first.color == second.color
                    && first.segments.iter().any(|segment| second.is_connected(segment))
                {
                    return Err(SimError::AdjacentBlocks {
                        color: first.color,
                        first: first.id.min(second.id),
                        second: first.id.max(second.id),
                    });
                }
            }
        }
        Ok(())
    }
}

impl Persist for SignalBlocks {
    fn from_record(record: &Record) -> SimResult<Self> {
        let mut signal_blocks = SignalBlocks::new();
        for block_record in record.get_records("signal_blocks") {
            let color = BlockColor::from_index(block_record.get_i64("color", 0).max(0) as usize)
                .unwrap_or_default();
            for segment_record in block_record.get_records("segments") {
                signal_blocks.add(color, segment_from_record(&segment_record));
            }
        }
        Ok(signal_blocks)
    }

    fn to_record(&self) -> Record {
        let blocks = self.blocks.iter().map(|block| {
            let mut block_record = Record::new();
            block_record
                .put_u64("id", block.id)
                .put_i64("color", block.color.index() as i64)
                .put_records("segments", block.segments.iter().map(segment_to_record));
            block_record
        });
        let mut record = Record::new();
        record.put_records("signal_blocks", blocks);
        record
    }
}
