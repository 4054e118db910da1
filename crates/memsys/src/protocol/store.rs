//! Coherent store.
//!
//! Stores are serialized behind the access issued right before them. A store
//! holding E or M completes locally; any other state asks the module below for
//! exclusive permission. The witness is signalled as soon as permission is
//! granted, which for a store coalesced onto an older one is right away.

use crate::cache::BlockState;
use crate::common::SimError;
use crate::config::ModuleKind;
use crate::engine::Continuation;
use crate::frame::{FrameId, RequestDirection};
use crate::sim::System;

use super::load::finish_access;
use super::{Event, FindAndLockStep, StoreStep, WriteRequestStep};

pub(crate) fn handle(sys: &mut System, step: StoreStep, id: FrameId) -> Result<(), SimError> {
    match step {
        StoreStep::Start => start(sys, id),
        StoreStep::Lock => lock(sys, id),
        StoreStep::Action => action(sys, id)?,
        StoreStep::Unlock => unlock(sys, id),
        StoreStep::Finish => finish_access(sys, id),
    }
    Ok(())
}

fn start(sys: &mut System, id: FrameId) {
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
            .push(Continuation::new(Event::Store(StoreStep::Finish), id));
        return;
    }
    sys.schedule(Event::Store(StoreStep::Lock), id, 0);
}

fn lock(sys: &mut System, id: FrameId) {
    let module = sys.frames[id].module;
    if let Some(prev) = sys.modules[module.0].in_flight.previous(id) {
        sys.frames[prev]
            .waiters
            .push(Continuation::new(Event::Store(StoreStep::Lock), id));
        return;
    }

    let mut child = sys.child_frame(id, module, sys.frames[id].addr);
    child.blocking = true;
    child.write = true;
    child.retry = sys.frames[id].retry;
    child.direction = RequestDirection::UpDown;
    sys.call(
        Event::FindAndLock(FindAndLockStep::Start),
        child,
        id,
        Event::Store(StoreStep::Action),
    );
}

fn retry(sys: &mut System, id: FrameId) {
    let module = sys.frames[id].module;
    sys.frames[id].retry = true;
    let delay = sys.retry_latency(module);
    sys.schedule(Event::Store(StoreStep::Lock), id, delay);
}

fn action(sys: &mut System, id: FrameId) -> Result<(), SimError> {
    if sys.frames[id].error {
        retry(sys, id);
        return Ok(());
    }

    let module = sys.frames[id].module;
    let state = sys.frames[id].state;
    if matches!(state, BlockState::Modified | BlockState::Exclusive)
        || sys.modules[module.0].kind() == ModuleKind::MainMemory
    {
        if let Some(witness) = sys.frames[id].witness.take() {
            witness.increment();
        }
        sys.schedule(Event::Store(StoreStep::Unlock), id, 0);
        return Ok(());
    }

    let tag = sys.frames[id].tag;
    let lower = sys.low_module_serving(module, tag)?;
    let mut child = sys.request_frame(id, module, lower, tag, RequestDirection::UpDown);
    child.witness = sys.frames[id].witness.take();
    sys.call(
        Event::WriteRequest(WriteRequestStep::Start),
        child,
        id,
        Event::Store(StoreStep::Unlock),
    );
    Ok(())
}

fn unlock(sys: &mut System, id: FrameId) {
    let (access, module, tag) = {
        let f = &sys.frames[id];
        (f.id, f.module, f.tag)
    };
    let (set, way) = sys.frames[id].slot();

    if sys.frames[id].error {
        sys.unlock_entry(module, set, way, access);
        retry(sys, id);
        return;
    }

    let m = &mut sys.modules[module.0];
    m.cache.set_block(set, way, tag, BlockState::Modified);
    m.stats.data_accesses += 1;
    let latency = m.data_latency();
    sys.unlock_entry(module, set, way, access);
    sys.schedule(Event::Store(StoreStep::Finish), id, latency);
}
