//! Local memories.
//!
//! A local memory is a scratchpad: it has ports, directory locks and in-flight
//! ordering like a cache, but no level below and no coherence traffic. A miss
//! installs the block Exclusive on the spot, dropping whatever occupied the
//! way; a store makes it Modified.

use crate::cache::BlockState;
use crate::common::SimError;
use crate::engine::Continuation;
use crate::frame::{FrameId, RequestDirection};
use crate::sim::System;

use super::load::finish_access;
use super::{Event, LocalFindAndLockStep, LocalLoadStep, LocalStoreStep};

pub(crate) fn handle_load(sys: &mut System, step: LocalLoadStep, id: FrameId) -> Result<(), SimError> {
    match step {
        LocalLoadStep::Start => {
            let module = sys.frames[id].module;
            let m = &mut sys.modules[module.0];
            m.in_flight.start_access(&sys.frames, id);
            if let Some(master) = m.in_flight.can_coalesce(&sys.frames, id) {
                m.stats.coalesced_reads += 1;
                m.in_flight.mark_coalesced(&mut sys.frames, id);
                sys.frames[id].master = Some(master);
                sys.frames[master]
                    .waiters
                    .push(Continuation::new(Event::LocalLoad(LocalLoadStep::Finish), id));
                return Ok(());
            }
            sys.schedule(Event::LocalLoad(LocalLoadStep::Lock), id, 0);
        }
        LocalLoadStep::Lock => {
            let module = sys.frames[id].module;
            let flight = &sys.modules[module.0].in_flight;
            let older = flight
                .in_flight_write(&sys.frames, id)
                .or_else(|| flight.in_flight_address(&sys.frames, id));
            if let Some(older) = older {
                sys.frames[older]
                    .waiters
                    .push(Continuation::new(Event::LocalLoad(LocalLoadStep::Lock), id));
                return Ok(());
            }
            call_find_and_lock(sys, id, false, Event::LocalLoad(LocalLoadStep::Action));
        }
        LocalLoadStep::Action => {
            if sys.frames[id].error {
                retry(sys, id, Event::LocalLoad(LocalLoadStep::Lock));
            } else {
                sys.schedule(Event::LocalLoad(LocalLoadStep::Unlock), id, 0);
            }
        }
        LocalLoadStep::Unlock => unlock(sys, id, Event::LocalLoad(LocalLoadStep::Finish)),
        LocalLoadStep::Finish => finish_access(sys, id),
    }
    Ok(())
}

pub(crate) fn handle_store(sys: &mut System, step: LocalStoreStep, id: FrameId) -> Result<(), SimError> {
    match step {
        LocalStoreStep::Start => {
            let module = sys.frames[id].module;
            let m = &mut sys.modules[module.0];
            m.in_flight.start_access(&sys.frames, id);
            if let Some(master) = m.in_flight.can_coalesce(&sys.frames, id) {
                m.stats.coalesced_writes += 1;
                m.in_flight.mark_coalesced(&mut sys.frames, id);
                let f = &mut sys.frames[id];
                f.master = Some(master);
                if let Some(witness) = f.witness.take() {
                    witness.increment();
                }
                sys.frames[master]
                    .waiters
                    .push(Continuation::new(Event::LocalStore(LocalStoreStep::Finish), id));
                return Ok(());
            }
            sys.schedule(Event::LocalStore(LocalStoreStep::Lock), id, 0);
        }
        LocalStoreStep::Lock => {
            let module = sys.frames[id].module;
            if let Some(prev) = sys.modules[module.0].in_flight.previous(id) {
                sys.frames[prev]
                    .waiters
                    .push(Continuation::new(Event::LocalStore(LocalStoreStep::Lock), id));
                return Ok(());
            }
            call_find_and_lock(sys, id, true, Event::LocalStore(LocalStoreStep::Action));
        }
        LocalStoreStep::Action => {
            if sys.frames[id].error {
                retry(sys, id, Event::LocalStore(LocalStoreStep::Lock));
                return Ok(());
            }
            let (module, tag) = (sys.frames[id].module, sys.frames[id].tag);
            let (set, way) = sys.frames[id].slot();
            sys.modules[module.0].cache.set_block(set, way, tag, BlockState::Modified);
            sys.schedule(Event::LocalStore(LocalStoreStep::Unlock), id, 0);
        }
        LocalStoreStep::Unlock => unlock(sys, id, Event::LocalStore(LocalStoreStep::Finish)),
        LocalStoreStep::Finish => finish_access(sys, id),
    }
    Ok(())
}

pub(crate) fn handle_find_and_lock(
    sys: &mut System,
    step: LocalFindAndLockStep,
    id: FrameId,
) -> Result<(), SimError> {
    let Some(parent) = sys.frames[id].parent() else {
        panic!("local_find_and_lock A-{} has no caller", sys.frames[id].id);
    };
    let module = sys.frames[id].module;
    match step {
        LocalFindAndLockStep::Start => {
            sys.frames[parent].error = false;
            sys.lock_port(module, id, Event::LocalFindAndLock(LocalFindAndLockStep::Port));
        }
        LocalFindAndLockStep::Port => {
            let (access, addr, write, retry, blocking) = {
                let f = &sys.frames[id];
                (f.id, f.addr, f.write, f.retry, f.blocking)
            };
            sys.frames[parent].port_locked = true;
            let m = &mut sys.modules[module.0];
            let lookup = m.find_block(addr);
            let hit = lookup.is_hit();
            m.stats.accesses += 1;
            m.stats.hits += u64::from(hit);
            m.stats.retry_accesses += u64::from(retry);
            if write {
                m.stats.writes += 1;
                m.stats.write_hits += u64::from(hit);
            } else {
                m.stats.reads += 1;
                m.stats.read_hits += u64::from(hit);
            }

            let way = match (lookup.way, sys.frames[id].way) {
                (Some(way), _) | (None, Some(way)) => way,
                (None, None) => m.cache.replace_block(lookup.set),
            };
            {
                let f = &mut sys.frames[id];
                f.hit = hit;
                f.set = lookup.set;
                f.tag = lookup.tag;
                f.way = Some(way);
                f.state = m.cache.block(lookup.set, way).state;
            }

            if m.directory.is_entry_locked(lookup.set, way) && !blocking {
                m.stats.directory_entry_conflicts += 1;
                m.stats.retry_directory_entry_conflicts += u64::from(retry);
                sys.frames[parent].error = true;
                sys.unlock_port(module, id);
                sys.ret(id);
                return Ok(());
            }
            let waiter = Continuation::new(Event::LocalFindAndLock(LocalFindAndLockStep::Start), id);
            if !m.directory.lock_entry(lookup.set, way, access, waiter) {
                sys.unlock_port(module, id);
                return Ok(());
            }
            m.stats.directory_accesses += 1;
            m.cache.set_transient_tag(lookup.set, way, lookup.tag);
            m.cache.access_block(lookup.set, way);
            let latency = m.directory_latency();
            sys.schedule(Event::LocalFindAndLock(LocalFindAndLockStep::Action), id, latency);
        }
        LocalFindAndLockStep::Action => {
            sys.unlock_port(module, id);
            let (set, way) = sys.frames[id].slot();
            let (hit, tag, victim) = (sys.frames[id].hit, sys.frames[id].tag, sys.frames[id].state);
            let m = &mut sys.modules[module.0];
            if !hit {
                if victim.is_valid() {
                    m.stats.evictions += 1;
                }
                m.cache.set_block(set, way, tag, BlockState::Exclusive);
                sys.frames[id].state = BlockState::Exclusive;
            }
            let state = sys.frames[id].state;
            let p = &mut sys.frames[parent];
            p.set = set;
            p.way = Some(way);
            p.tag = tag;
            p.state = state;
            p.hit = hit;
            sys.ret(id);
        }
    }
    Ok(())
}

fn call_find_and_lock(sys: &mut System, id: FrameId, write: bool, resume: Event) {
    let module = sys.frames[id].module;
    let mut child = sys.child_frame(id, module, sys.frames[id].addr);
    child.blocking = true;
    child.read = !write;
    child.write = write;
    child.retry = sys.frames[id].retry;
    child.direction = RequestDirection::UpDown;
    sys.call(
        Event::LocalFindAndLock(LocalFindAndLockStep::Start),
        child,
        id,
        resume,
    );
}

fn retry(sys: &mut System, id: FrameId, resume: Event) {
    let module = sys.frames[id].module;
    sys.frames[id].retry = true;
    let delay = sys.retry_latency(module);
    sys.schedule(resume, id, delay);
}

fn unlock(sys: &mut System, id: FrameId, resume: Event) {
    let (access, module) = (sys.frames[id].id, sys.frames[id].module);
    let (set, way) = sys.frames[id].slot();
    sys.unlock_entry(module, set, way, access);
    let m = &mut sys.modules[module.0];
    m.stats.data_accesses += 1;
    let latency = m.data_latency();
    sys.schedule(resume, id, latency);
}
