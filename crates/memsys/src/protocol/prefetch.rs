//! Prefetch.
//!
//! A prefetch brings a block in without blocking anything: it is dropped when
//! another access to the block is in flight or when its lookup hits a locked
//! entry, and a hit makes it useless. It never coalesces and never retries.

use crate::cache::BlockState;
use crate::common::SimError;
use crate::config::ModuleKind;
use crate::frame::{FrameId, RequestDirection};
use crate::sim::System;

use super::{Event, FindAndLockStep, PrefetchStep, ReadRequestStep};

pub(crate) fn handle(sys: &mut System, step: PrefetchStep, id: FrameId) -> Result<(), SimError> {
    match step {
        PrefetchStep::Start => start(sys, id),
        PrefetchStep::Lock => lock(sys, id),
        PrefetchStep::Action => action(sys, id)?,
        PrefetchStep::Miss => miss(sys, id),
        PrefetchStep::Unlock => unlock(sys, id),
        PrefetchStep::Finish => finish(sys, id),
    }
    Ok(())
}

fn start(sys: &mut System, id: FrameId) {
    let (module, addr) = (sys.frames[id].module, sys.frames[id].addr);
    let m = &mut sys.modules[module.0];
    m.stats.prefetches += 1;
    if m.in_flight.youngest_in_block(addr).is_some() {
        m.stats.dropped_prefetches += 1;
        sys.schedule(Event::Prefetch(PrefetchStep::Finish), id, 0);
        return;
    }
    m.in_flight.start_access(&sys.frames, id);
    sys.schedule(Event::Prefetch(PrefetchStep::Lock), id, 0);
}

fn lock(sys: &mut System, id: FrameId) {
    let module = sys.frames[id].module;
    let mut child = sys.child_frame(id, module, sys.frames[id].addr);
    child.blocking = false;
    child.read = true;
    child.direction = RequestDirection::UpDown;
    sys.call(
        Event::FindAndLock(FindAndLockStep::Start),
        child,
        id,
        Event::Prefetch(PrefetchStep::Action),
    );
}

fn action(sys: &mut System, id: FrameId) -> Result<(), SimError> {
    let module = sys.frames[id].module;
    if sys.frames[id].error {
        sys.modules[module.0].stats.dropped_prefetches += 1;
        sys.schedule(Event::Prefetch(PrefetchStep::Finish), id, 0);
        return Ok(());
    }

    if sys.frames[id].hit {
        sys.modules[module.0].stats.useless_prefetches += 1;
        sys.schedule(Event::Prefetch(PrefetchStep::Unlock), id, 0);
        return Ok(());
    }
    if sys.modules[module.0].kind() == ModuleKind::MainMemory {
        sys.schedule(Event::Prefetch(PrefetchStep::Unlock), id, 0);
        return Ok(());
    }

    let tag = sys.frames[id].tag;
    let lower = sys.low_module_serving(module, tag)?;
    let child = sys.request_frame(id, module, lower, tag, RequestDirection::UpDown);
    sys.call(
        Event::ReadRequest(ReadRequestStep::Start),
        child,
        id,
        Event::Prefetch(PrefetchStep::Miss),
    );
    Ok(())
}

fn miss(sys: &mut System, id: FrameId) {
    let (access, module, tag, shared) = {
        let f = &sys.frames[id];
        (f.id, f.module, f.tag, f.shared)
    };
    let (set, way) = sys.frames[id].slot();

    if sys.frames[id].error {
        sys.unlock_entry(module, set, way, access);
        sys.modules[module.0].stats.dropped_prefetches += 1;
        sys.schedule(Event::Prefetch(PrefetchStep::Finish), id, 0);
        return;
    }

    let state = if shared { BlockState::Shared } else { BlockState::Exclusive };
    sys.modules[module.0].cache.set_block(set, way, tag, state);
    sys.schedule(Event::Prefetch(PrefetchStep::Unlock), id, 0);
}

fn unlock(sys: &mut System, id: FrameId) {
    let (access, module) = (sys.frames[id].id, sys.frames[id].module);
    let (set, way) = sys.frames[id].slot();
    sys.unlock_entry(module, set, way, access);
    let m = &mut sys.modules[module.0];
    m.stats.data_accesses += 1;
    let latency = m.data_latency();
    sys.schedule(Event::Prefetch(PrefetchStep::Finish), id, latency);
}

fn finish(sys: &mut System, id: FrameId) {
    if let Some(witness) = sys.frames[id].witness.take() {
        witness.increment();
    }
    let (access, module) = (sys.frames[id].id, sys.frames[id].module);
    if sys.modules[module.0].in_flight.contains_id(access) {
        let waiters = sys.modules[module.0].in_flight.finish_access(&mut sys.frames, id);
        sys.wake(waiters, 0);
    }
    sys.ret(id);
}
