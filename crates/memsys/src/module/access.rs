//! In-Flight Access Tracking.
//!
//! Every top-level access is registered here from its first event until its
//! finish event. The indices answer the ordering questions of the protocol:
//! which older store a load must wait for, which older access to the same
//! block is still running, and which access a new one may coalesce onto.

use std::collections::{HashMap, HashSet};

use crate::common::addr::block_align;
use crate::common::{AccessKind, Address};
use crate::engine::Continuation;
use crate::frame::{AccessId, FrameArena, FrameId};

/// In-flight accesses of one module, in issue order.
#[derive(Debug)]
pub struct InFlight {
    block_size: u64,
    accesses: Vec<FrameId>,
    writes: Vec<FrameId>,
    by_block: HashMap<Address, Vec<FrameId>>,
    ids: HashSet<AccessId>,
    coalesced: usize,
}

impl InFlight {
    /// Creates empty indices for a module with `block_size`-byte blocks.
    pub fn new(block_size: u64) -> Self {
        Self {
            block_size,
            accesses: Vec::new(),
            writes: Vec::new(),
            by_block: HashMap::new(),
            ids: HashSet::new(),
            coalesced: 0,
        }
    }

    #[inline]
    fn block_of(&self, addr: Address) -> Address {
        block_align(addr, self.block_size)
    }

    /// Number of in-flight accesses, coalesced ones included.
    pub fn len(&self) -> usize {
        self.accesses.len()
    }

    /// True when nothing is in flight.
    pub fn is_empty(&self) -> bool {
        self.accesses.is_empty()
    }

    /// Number of in-flight stores.
    pub fn num_writes(&self) -> usize {
        self.writes.len()
    }

    /// Number of in-flight accesses riding on another one.
    pub fn num_coalesced(&self) -> usize {
        self.coalesced
    }

    /// Number of accesses that occupy an MSHR entry.
    pub fn num_non_coalesced(&self) -> usize {
        self.accesses.len() - self.coalesced
    }

    /// True while access `id` is registered.
    pub fn contains_id(&self, id: AccessId) -> bool {
        self.ids.contains(&id)
    }

    /// Number of registered accesses to the block holding `addr`.
    pub fn num_in_block(&self, addr: Address) -> usize {
        self.by_block.get(&self.block_of(addr)).map_or(0, Vec::len)
    }

    /// Registers `frame` as the youngest in-flight access.
    ///
    /// # Panics
    ///
    /// Panics if the frame is not a top-level access or is already registered.
    pub fn start_access(&mut self, frames: &FrameArena, frame: FrameId) {
        let f = &frames[frame];
        let kind = match f.access {
            Some(kind) => kind,
            None => panic!("A-{} is not a top-level access", f.id),
        };
        assert!(self.ids.insert(f.id), "A-{} registered twice", f.id);
        self.accesses.push(frame);
        if kind == AccessKind::Store {
            self.writes.push(frame);
        }
        self.by_block.entry(self.block_of(f.addr)).or_default().push(frame);
    }

    /// Counts `frame` as coalesced; it no longer holds an MSHR entry.
    pub fn mark_coalesced(&mut self, frames: &mut FrameArena, frame: FrameId) {
        frames[frame].coalesced = true;
        self.coalesced += 1;
    }

    /// Removes `frame` from every index.
    ///
    /// Younger accesses coalesced onto `frame` lose their master pointer.
    ///
    /// # Returns
    ///
    /// The continuations that were waiting for `frame` to finish.
    pub fn finish_access(&mut self, frames: &mut FrameArena, frame: FrameId) -> Vec<Continuation> {
        let (id, addr, coalesced) = {
            let f = &frames[frame];
            (f.id, f.addr, f.coalesced)
        };
        if let Some(pos) = self.accesses.iter().position(|&f| f == frame) {
            let _ = self.accesses.remove(pos);
        }
        if let Some(pos) = self.writes.iter().position(|&f| f == frame) {
            let _ = self.writes.remove(pos);
        }
        let block = self.block_of(addr);
        if let Some(list) = self.by_block.get_mut(&block) {
            list.retain(|&f| f != frame);
            if list.is_empty() {
                let _ = self.by_block.remove(&block);
            }
        }
        let _ = self.ids.remove(&id);
        if coalesced {
            self.coalesced -= 1;
        }

        for &other in &self.accesses {
            if frames[other].master == Some(frame) {
                frames[other].master = None;
            }
        }
        std::mem::take(&mut frames[frame].waiters)
    }

    /// Access issued immediately before `frame`, if still in flight.
    pub fn previous(&self, frame: FrameId) -> Option<FrameId> {
        let pos = self.accesses.iter().position(|&f| f == frame)?;
        pos.checked_sub(1).map(|prev| self.accesses[prev])
    }

    /// Finds the access `frame` may coalesce onto.
    ///
    /// Only the access issued right before `frame` is a candidate, and only
    /// when it has the same kind and block. Loads always merge; stores and
    /// non-coherent stores merge only while the candidate has not locked a
    /// port yet. Coalescing is single-level: the candidate's own master is
    /// returned when it has one.
    pub fn can_coalesce(&self, frames: &FrameArena, frame: FrameId) -> Option<FrameId> {
        let f = &frames[frame];
        let kind = f.access?;
        if !matches!(kind, AccessKind::Load | AccessKind::Store | AccessKind::NcStore) {
            return None;
        }
        let prev_id = self.previous(frame)?;
        let prev = &frames[prev_id];
        if prev.access != Some(kind) || self.block_of(prev.addr) != self.block_of(f.addr) {
            return None;
        }
        if kind != AccessKind::Load && prev.port_locked {
            return None;
        }
        Some(prev.master.unwrap_or(prev_id))
    }

    /// Youngest access to the same block as `frame` issued before it.
    pub fn in_flight_address(&self, frames: &FrameArena, frame: FrameId) -> Option<FrameId> {
        let f = &frames[frame];
        self.by_block
            .get(&self.block_of(f.addr))?
            .iter()
            .copied()
            .filter(|&other| other != frame && frames[other].id < f.id)
            .max_by_key(|&other| frames[other].id)
    }

    /// Youngest access of any kind to the block holding `addr`.
    pub fn youngest_in_block(&self, addr: Address) -> Option<FrameId> {
        self.by_block.get(&self.block_of(addr))?.last().copied()
    }

    /// Youngest store issued before `frame`.
    pub fn in_flight_write(&self, frames: &FrameArena, frame: FrameId) -> Option<FrameId> {
        let id = frames[frame].id;
        self.writes
            .iter()
            .rev()
            .copied()
            .find(|&w| w != frame && frames[w].id < id)
    }
}
