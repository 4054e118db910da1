//! Flush.
//!
//! Removes a block from a module and from every module above it, writing
//! dirty data back to the level below. A block that is not present makes the
//! flush complete immediately. Flushes are not ordered against other
//! accesses of the module.

use crate::common::SimError;
use crate::frame::{FrameId, RequestDirection};
use crate::sim::System;

use super::{EvictStep, Event, FindAndLockStep, FlushStep};

pub(crate) fn handle(sys: &mut System, step: FlushStep, id: FrameId) -> Result<(), SimError> {
    match step {
        FlushStep::Start => start(sys, id),
        FlushStep::Action => action(sys, id),
        FlushStep::Unlock => unlock(sys, id),
        FlushStep::Finish => {
            if let Some(witness) = sys.frames[id].witness.take() {
                witness.increment();
            }
            sys.ret(id);
        }
    }
    Ok(())
}

fn start(sys: &mut System, id: FrameId) {
    let module = sys.frames[id].module;
    if !sys.frames[id].retry {
        sys.modules[module.0].stats.flushes += 1;
    }
    let mut child = sys.child_frame(id, module, sys.frames[id].addr);
    child.blocking = true;
    child.write = true;
    child.retry = sys.frames[id].retry;
    child.direction = RequestDirection::DownUp;
    sys.call(
        Event::FindAndLock(FindAndLockStep::Start),
        child,
        id,
        Event::Flush(FlushStep::Action),
    );
}

fn action(sys: &mut System, id: FrameId) {
    if sys.frames[id].block_not_found {
        sys.schedule(Event::Flush(FlushStep::Finish), id, 0);
        return;
    }

    let module = sys.frames[id].module;
    let (set, way) = sys.frames[id].slot();
    let mut child = sys.child_frame(id, module, 0);
    child.set = set;
    child.way = Some(way);
    sys.call(
        Event::Evict(EvictStep::Start),
        child,
        id,
        Event::Flush(FlushStep::Unlock),
    );
}

fn unlock(sys: &mut System, id: FrameId) {
    let (access, module) = (sys.frames[id].id, sys.frames[id].module);
    let (set, way) = sys.frames[id].slot();
    sys.unlock_entry(module, set, way, access);

    if sys.frames[id].error {
        sys.frames[id].retry = true;
        let delay = sys.retry_latency(module);
        sys.schedule(Event::Flush(FlushStep::Start), id, delay);
        return;
    }
    sys.schedule(Event::Flush(FlushStep::Finish), id, 0);
}
