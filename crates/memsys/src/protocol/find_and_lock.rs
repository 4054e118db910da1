//! Block lookup with port and directory-entry locking.
//!
//! The caller fills a child frame with the address, the direction and the
//! blocking/read/write flags, and gets back in its own frame the set, way,
//! tag and state of the block plus `hit`, `error` and `block_not_found`.
//! On success the block's directory entry stays locked for the caller's
//! access id; the caller must unlock it.
//!
//! Up-down misses allocate a way, evicting a valid victim first. Down-up
//! misses never allocate.

use crate::cache::BlockState;
use crate::common::SimError;
use crate::config::ModuleKind;
use crate::engine::Continuation;
use crate::frame::{FrameId, RequestDirection};
use crate::sim::System;

use super::{EvictStep, Event, FindAndLockStep};

pub(crate) fn handle(sys: &mut System, step: FindAndLockStep, id: FrameId) -> Result<(), SimError> {
    match step {
        FindAndLockStep::Start => start(sys, id),
        FindAndLockStep::Port => port(sys, id),
        FindAndLockStep::Action => action(sys, id),
        FindAndLockStep::Finish => finish(sys, id),
    }
    Ok(())
}

fn parent_of(sys: &System, id: FrameId) -> FrameId {
    match sys.frames[id].parent() {
        Some(parent) => parent,
        None => panic!("find_and_lock A-{} has no caller", sys.frames[id].id),
    }
}

fn start(sys: &mut System, id: FrameId) {
    let parent = parent_of(sys, id);
    sys.frames[parent].error = false;
    let module = sys.frames[id].module;
    sys.lock_port(module, id, Event::FindAndLock(FindAndLockStep::Port));
}

fn port(sys: &mut System, id: FrameId) {
    let parent = parent_of(sys, id);
    let (access, module, addr, direction, read, nc_write, retry, blocking) = {
        let f = &sys.frames[id];
        (f.id, f.module, f.addr, f.direction, f.read, f.nc_write, f.retry, f.blocking)
    };
    sys.frames[parent].port_locked = true;

    let lookup = sys.modules[module.0].find_block(addr);
    let hit = lookup.is_hit();
    {
        let stats = &mut sys.modules[module.0].stats;
        match direction {
            RequestDirection::UpDown => {
                stats.accesses += 1;
                stats.hits += u64::from(hit);
                stats.retry_accesses += u64::from(retry);
                if nc_write {
                    stats.nc_writes += 1;
                    stats.nc_write_hits += u64::from(hit);
                } else if read {
                    stats.reads += 1;
                    stats.read_hits += u64::from(hit);
                } else {
                    stats.writes += 1;
                    stats.write_hits += u64::from(hit);
                }
            }
            RequestDirection::DownUp => stats.probes += 1,
        }
    }

    {
        let f = &mut sys.frames[id];
        f.hit = hit;
        f.set = lookup.set;
        f.tag = lookup.tag;
        f.block_not_found = false;
    }

    if hit {
        let f = &mut sys.frames[id];
        f.way = lookup.way;
        f.state = lookup.state;
    } else {
        if direction == RequestDirection::DownUp {
            sys.frames[id].block_not_found = true;
            sys.frames[parent].block_not_found = true;
            sys.unlock_port(module, id);
            sys.ret(id);
            return;
        }
        // Keep the victim chosen before a lock wait so the retry does not
        // disturb the replacement order again.
        let way = match sys.frames[id].way {
            Some(way) => way,
            None => sys.modules[module.0].cache.replace_block(lookup.set),
        };
        let victim = sys.modules[module.0].cache.block(lookup.set, way).state;
        let f = &mut sys.frames[id];
        f.way = Some(way);
        f.state = victim;
    }

    let (set, way) = sys.frames[id].slot();
    let m = &mut sys.modules[module.0];
    if m.directory.is_entry_locked(set, way) && !blocking {
        m.stats.directory_entry_conflicts += 1;
        m.stats.retry_directory_entry_conflicts += u64::from(retry);
        sys.frames[parent].error = true;
        sys.unlock_port(module, id);
        sys.ret(id);
        return;
    }

    let waiter = Continuation::new(Event::FindAndLock(FindAndLockStep::Start), id);
    if !m.directory.lock_entry(set, way, access, waiter) {
        sys.unlock_port(module, id);
        return;
    }

    m.stats.directory_accesses += 1;
    m.cache.set_transient_tag(set, way, lookup.tag);
    m.cache.access_block(set, way);
    let latency = m.directory_latency();
    sys.schedule(Event::FindAndLock(FindAndLockStep::Action), id, latency);
}

fn action(sys: &mut System, id: FrameId) {
    let module = sys.frames[id].module;
    sys.unlock_port(module, id);

    let (hit, state) = (sys.frames[id].hit, sys.frames[id].state);
    if !hit && state.is_valid() {
        let (set, way) = sys.frames[id].slot();
        sys.frames[id].eviction = true;
        sys.modules[module.0].stats.conflict_invalidations += 1;
        let mut child = sys.child_frame(id, module, 0);
        child.set = set;
        child.way = Some(way);
        sys.call(
            Event::Evict(EvictStep::Start),
            child,
            id,
            Event::FindAndLock(FindAndLockStep::Finish),
        );
        return;
    }
    sys.schedule(Event::FindAndLock(FindAndLockStep::Finish), id, 0);
}

fn finish(sys: &mut System, id: FrameId) {
    let parent = parent_of(sys, id);
    let (access, module) = (sys.frames[id].id, sys.frames[id].module);
    let (set, way) = sys.frames[id].slot();

    if sys.frames[id].error {
        sys.unlock_entry(module, set, way, access);
        sys.frames[parent].error = true;
        sys.ret(id);
        return;
    }

    if sys.frames[id].eviction {
        sys.modules[module.0].stats.evictions += 1;
        let state = sys.modules[module.0].cache.block(set, way).state;
        assert!(
            !state.is_valid(),
            "victim ({set}, {way}) of '{}' still {state} after eviction",
            sys.modules[module.0].name()
        );
        sys.frames[id].state = state;
    }

    // Main memory holds every block: a miss there is filled on the spot.
    if sys.modules[module.0].kind() == ModuleKind::MainMemory && !sys.frames[id].state.is_valid() {
        let tag = sys.frames[id].tag;
        sys.modules[module.0].cache.set_block(set, way, tag, BlockState::Exclusive);
        sys.frames[id].state = BlockState::Exclusive;
    }

    let (tag, state, hit) = {
        let f = &sys.frames[id];
        (f.tag, f.state, f.hit)
    };
    let p = &mut sys.frames[parent];
    p.set = set;
    p.way = Some(way);
    p.tag = tag;
    p.state = state;
    p.hit = hit;
    p.block_not_found = false;
    sys.ret(id);
}
