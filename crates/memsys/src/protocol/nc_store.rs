//! Non-coherent store.
//!
//! The block ends NonCoherent without invalidating other copies. Dirty
//! coherent data (M, O) is written back first so that the level below stays
//! the reference copy. Clean exclusive blocks only drop their ownership below;
//! missing blocks are fetched with a non-coherent read, which never makes the
//! requester an owner.

use crate::cache::BlockState;
use crate::common::SimError;
use crate::config::ModuleKind;
use crate::engine::Continuation;
use crate::frame::{FrameId, MessageKind, RequestDirection};
use crate::sim::System;

use super::load::finish_access;
use super::{EvictStep, Event, FindAndLockStep, MessageStep, NcStoreStep, ReadRequestStep};

pub(crate) fn handle(sys: &mut System, step: NcStoreStep, id: FrameId) -> Result<(), SimError> {
    match step {
        NcStoreStep::Start => start(sys, id),
        NcStoreStep::Lock => lock(sys, id),
        NcStoreStep::Writeback => writeback(sys, id),
        NcStoreStep::Action => action(sys, id)?,
        NcStoreStep::Miss => miss(sys, id),
        NcStoreStep::Unlock => unlock(sys, id),
        NcStoreStep::Finish => finish_access(sys, id),
    }
    Ok(())
}

fn start(sys: &mut System, id: FrameId) {
    let module = sys.frames[id].module;
    let m = &mut sys.modules[module.0];
    m.in_flight.start_access(&sys.frames, id);

    if let Some(master) = m.in_flight.can_coalesce(&sys.frames, id) {
        m.stats.coalesced_nc_writes += 1;
        m.in_flight.mark_coalesced(&mut sys.frames, id);
        sys.frames[id].master = Some(master);
        sys.frames[master]
            .waiters
            .push(Continuation::new(Event::NcStore(NcStoreStep::Finish), id));
        return;
    }
    sys.schedule(Event::NcStore(NcStoreStep::Lock), id, 0);
}

fn lock(sys: &mut System, id: FrameId) {
    let module = sys.frames[id].module;
    if let Some(prev) = sys.modules[module.0].in_flight.previous(id) {
        sys.frames[prev]
            .waiters
            .push(Continuation::new(Event::NcStore(NcStoreStep::Lock), id));
        return;
    }

    let mut child = sys.child_frame(id, module, sys.frames[id].addr);
    child.blocking = true;
    child.write = true;
    child.nc_write = true;
    child.retry = sys.frames[id].retry;
    child.direction = RequestDirection::UpDown;
    sys.call(
        Event::FindAndLock(FindAndLockStep::Start),
        child,
        id,
        Event::NcStore(NcStoreStep::Writeback),
    );
}

fn retry(sys: &mut System, id: FrameId) {
    let module = sys.frames[id].module;
    sys.frames[id].retry = true;
    let delay = sys.retry_latency(module);
    sys.schedule(Event::NcStore(NcStoreStep::Lock), id, delay);
}

fn unlock_and_retry(sys: &mut System, id: FrameId) {
    let (access, module) = (sys.frames[id].id, sys.frames[id].module);
    let (set, way) = sys.frames[id].slot();
    sys.unlock_entry(module, set, way, access);
    retry(sys, id);
}

fn writeback(sys: &mut System, id: FrameId) {
    if sys.frames[id].error {
        retry(sys, id);
        return;
    }

    let module = sys.frames[id].module;
    let state = sys.frames[id].state;
    if sys.modules[module.0].kind() != ModuleKind::MainMemory
        && matches!(state, BlockState::Modified | BlockState::Owned)
    {
        let (set, way) = sys.frames[id].slot();
        let mut child = sys.child_frame(id, module, 0);
        child.set = set;
        child.way = Some(way);
        sys.call(
            Event::Evict(EvictStep::Start),
            child,
            id,
            Event::NcStore(NcStoreStep::Action),
        );
        return;
    }
    sys.schedule(Event::NcStore(NcStoreStep::Action), id, 0);
}

fn action(sys: &mut System, id: FrameId) -> Result<(), SimError> {
    if sys.frames[id].error {
        unlock_and_retry(sys, id);
        return Ok(());
    }

    let (module, tag) = (sys.frames[id].module, sys.frames[id].tag);
    let (set, way) = sys.frames[id].slot();
    let m = &sys.modules[module.0];
    // Re-read: the write-back above may have invalidated the block.
    let state = m.cache.block(set, way).state;
    if m.kind() == ModuleKind::MainMemory
        || matches!(state, BlockState::Shared | BlockState::NonCoherent)
    {
        sys.schedule(Event::NcStore(NcStoreStep::Unlock), id, 0);
        return Ok(());
    }

    let lower = sys.low_module_serving(module, tag)?;
    let mut child = sys.request_frame(id, module, lower, tag, RequestDirection::UpDown);
    if state == BlockState::Exclusive {
        child.message_kind = Some(MessageKind::ClearOwner);
        sys.call(
            Event::Message(MessageStep::Start),
            child,
            id,
            Event::NcStore(NcStoreStep::Unlock),
        );
    } else {
        child.nc_write = true;
        sys.call(
            Event::ReadRequest(ReadRequestStep::Start),
            child,
            id,
            Event::NcStore(NcStoreStep::Miss),
        );
    }
    Ok(())
}

fn miss(sys: &mut System, id: FrameId) {
    if sys.frames[id].error {
        unlock_and_retry(sys, id);
        return;
    }
    sys.schedule(Event::NcStore(NcStoreStep::Unlock), id, 0);
}

fn unlock(sys: &mut System, id: FrameId) {
    if sys.frames[id].error {
        unlock_and_retry(sys, id);
        return;
    }

    let (access, module, tag) = {
        let f = &sys.frames[id];
        (f.id, f.module, f.tag)
    };
    let (set, way) = sys.frames[id].slot();
    let m = &mut sys.modules[module.0];
    m.cache.set_block(set, way, tag, BlockState::NonCoherent);
    m.stats.data_accesses += 1;
    let latency = m.data_latency();
    sys.unlock_entry(module, set, way, access);
    sys.schedule(Event::NcStore(NcStoreStep::Finish), id, latency);
}
