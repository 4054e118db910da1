//! Coherent load.
//!
//! A load coalesces onto the access issued right before it when that one is
//! a load of the same block. Otherwise it waits for every older store and for
//! the youngest older access to its block, locks the block, and on a miss
//! fetches it from the module below. Conflicts are retried after a jittered
//! delay.

use crate::cache::BlockState;
use crate::common::SimError;
use crate::config::ModuleKind;
use crate::engine::Continuation;
use crate::frame::{FrameId, RequestDirection};
use crate::sim::System;

use super::{Event, FindAndLockStep, LoadStep, ReadRequestStep};

pub(crate) fn handle(sys: &mut System, step: LoadStep, id: FrameId) -> Result<(), SimError> {
    match step {
        LoadStep::Start => start(sys, id),
        LoadStep::Lock => lock(sys, id),
        LoadStep::Action => action(sys, id)?,
        LoadStep::Miss => miss(sys, id),
        LoadStep::Unlock => unlock(sys, id),
        LoadStep::Finish => finish(sys, id),
    }
    Ok(())
}

fn start(sys: &mut System, id: FrameId) {
    let module = sys.frames[id].module;
    let m = &mut sys.modules[module.0];
    m.in_flight.start_access(&sys.frames, id);

    if let Some(master) = m.in_flight.can_coalesce(&sys.frames, id) {
        m.stats.coalesced_reads += 1;
        sys.frames[id].master = Some(master);
        m.in_flight.mark_coalesced(&mut sys.frames, id);
        sys.frames[master]
            .waiters
            .push(Continuation::new(Event::Load(LoadStep::Finish), id));
        return;
    }
    sys.schedule(Event::Load(LoadStep::Lock), id, 0);
}

fn lock(sys: &mut System, id: FrameId) {
    let module = sys.frames[id].module;
    let flight = &sys.modules[module.0].in_flight;
    let older = flight
        .in_flight_write(&sys.frames, id)
        .or_else(|| flight.in_flight_address(&sys.frames, id));
    if let Some(older) = older {
        sys.frames[older]
            .waiters
            .push(Continuation::new(Event::Load(LoadStep::Lock), id));
        return;
    }

    let mut child = sys.child_frame(id, module, sys.frames[id].addr);
    child.blocking = true;
    child.read = true;
    child.retry = sys.frames[id].retry;
    child.direction = RequestDirection::UpDown;
    sys.call(
        Event::FindAndLock(FindAndLockStep::Start),
        child,
        id,
        Event::Load(LoadStep::Action),
    );
}

fn retry(sys: &mut System, id: FrameId) {
    let module = sys.frames[id].module;
    sys.frames[id].retry = true;
    let delay = sys.retry_latency(module);
    sys.schedule(Event::Load(LoadStep::Lock), id, delay);
}

fn action(sys: &mut System, id: FrameId) -> Result<(), SimError> {
    if sys.frames[id].error {
        retry(sys, id);
        return Ok(());
    }

    let module = sys.frames[id].module;
    if sys.frames[id].hit || sys.modules[module.0].kind() == ModuleKind::MainMemory {
        sys.schedule(Event::Load(LoadStep::Unlock), id, 0);
        return Ok(());
    }

    let tag = sys.frames[id].tag;
    let lower = sys.low_module_serving(module, tag)?;
    let child = sys.request_frame(id, module, lower, tag, RequestDirection::UpDown);
    sys.call(
        Event::ReadRequest(ReadRequestStep::Start),
        child,
        id,
        Event::Load(LoadStep::Miss),
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
        retry(sys, id);
        return;
    }

    let state = if shared { BlockState::Shared } else { BlockState::Exclusive };
    sys.modules[module.0].cache.set_block(set, way, tag, state);
    sys.schedule(Event::Load(LoadStep::Unlock), id, 0);
}

fn unlock(sys: &mut System, id: FrameId) {
    let (access, module) = (sys.frames[id].id, sys.frames[id].module);
    let (set, way) = sys.frames[id].slot();
    sys.unlock_entry(module, set, way, access);
    let m = &mut sys.modules[module.0];
    m.stats.data_accesses += 1;
    let latency = m.data_latency();
    sys.schedule(Event::Load(LoadStep::Finish), id, latency);
}

/// Common finish of the top-level accesses: signal the witness, deregister
/// the access, wake its waiters and complete it.
pub(crate) fn finish_access(sys: &mut System, id: FrameId) {
    if let Some(witness) = sys.frames[id].witness.take() {
        witness.increment();
    }
    let module = sys.frames[id].module;
    let waiters = sys.modules[module.0].in_flight.finish_access(&mut sys.frames, id);
    sys.wake(waiters, 0);
    sys.ret(id);
}

fn finish(sys: &mut System, id: FrameId) {
    finish_access(sys, id);
}
