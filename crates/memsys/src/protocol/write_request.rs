//! Write requests between adjacent levels.
//!
//! Up-down, the requester asks the module below for exclusive permission on a
//! block: the target invalidates every other upper copy, obtains exclusivity
//! from its own lower level if it lacks it, and records the requester as the
//! only sharer and owner. Down-up, the module below asks an upper module to
//! give its copy up: the target invalidates its own upper copies, then
//! invalidates its block and returns the data if it was dirty.
//!
//! The frame runs on the requester (`module`); `target` is where the block is
//! looked up.

use crate::cache::BlockState;
use crate::common::SimError;
use crate::config::ModuleKind;
use crate::frame::{FrameId, Reply, RequestDirection};
use crate::module::ModuleId;
use crate::sim::System;

use super::{Event, FindAndLockStep, InvalidateStep, WriteRequestStep};

const CONTROL_SIZE: u64 = 8;

pub(crate) fn handle(sys: &mut System, step: WriteRequestStep, id: FrameId) -> Result<(), SimError> {
    match step {
        WriteRequestStep::Start => start(sys, id),
        WriteRequestStep::Receive => receive(sys, id),
        WriteRequestStep::Action => action(sys, id),
        WriteRequestStep::Exclusive => {
            let next = match sys.frames[id].direction {
                RequestDirection::UpDown => WriteRequestStep::UpDown,
                RequestDirection::DownUp => WriteRequestStep::DownUp,
            };
            sys.schedule(Event::WriteRequest(next), id, 0);
        }
        WriteRequestStep::UpDown => up_down(sys, id)?,
        WriteRequestStep::UpDownFinish => up_down_finish(sys, id),
        WriteRequestStep::DownUp => down_up(sys, id),
        WriteRequestStep::Reply => reply(sys, id),
        WriteRequestStep::Finish => finish(sys, id),
    }
    Ok(())
}

fn endpoints(sys: &System, id: FrameId) -> (ModuleId, ModuleId) {
    let f = &sys.frames[id];
    match f.target {
        Some(target) => (f.module, target),
        None => panic!("write_request A-{} has no target", f.id),
    }
}

fn parent_of(sys: &System, id: FrameId) -> FrameId {
    match sys.frames[id].parent() {
        Some(parent) => parent,
        None => panic!("write_request A-{} has no caller", sys.frames[id].id),
    }
}

fn start(sys: &mut System, id: FrameId) {
    let (module, target) = endpoints(sys, id);
    sys.send(
        id,
        module,
        target,
        CONTROL_SIZE,
        Event::WriteRequest(WriteRequestStep::Receive),
        Event::WriteRequest(WriteRequestStep::Start),
    );
}

fn receive(sys: &mut System, id: FrameId) {
    let (module, target) = endpoints(sys, id);
    sys.receive(id, module, target);

    let direction = sys.frames[id].direction;
    let mut child = sys.child_frame(id, target, sys.frames[id].addr);
    child.direction = direction;
    child.blocking = direction == RequestDirection::DownUp;
    child.write = true;
    sys.call(
        Event::FindAndLock(FindAndLockStep::Start),
        child,
        id,
        Event::WriteRequest(WriteRequestStep::Action),
    );
}

fn action(sys: &mut System, id: FrameId) {
    let (module, target) = endpoints(sys, id);
    let parent = parent_of(sys, id);

    if sys.frames[id].error {
        sys.frames[parent].error = true;
        sys.frames[parent].set_reply_if_higher(Reply::AckError);
        sys.frames[id].reply_size = CONTROL_SIZE;
        sys.schedule(Event::WriteRequest(WriteRequestStep::Reply), id, 0);
        return;
    }

    if sys.frames[id].block_not_found {
        sys.frames[parent].set_reply_if_higher(Reply::Ack);
        sys.frames[id].reply_size = CONTROL_SIZE;
        sys.schedule(Event::WriteRequest(WriteRequestStep::Reply), id, 0);
        return;
    }

    let (set, way) = sys.frames[id].slot();
    let mut child = sys.child_frame(id, target, sys.frames[id].tag);
    child.set = set;
    child.way = Some(way);
    child.except = Some(module);
    sys.call(
        Event::Invalidate(InvalidateStep::Start),
        child,
        id,
        Event::WriteRequest(WriteRequestStep::Exclusive),
    );
}

fn up_down(sys: &mut System, id: FrameId) -> Result<(), SimError> {
    let (_, target) = endpoints(sys, id);
    let state = sys.frames[id].state;
    let kind = sys.modules[target.0].kind();
    if matches!(state, BlockState::Modified | BlockState::Exclusive) || kind == ModuleKind::MainMemory {
        sys.schedule(Event::WriteRequest(WriteRequestStep::UpDownFinish), id, 0);
        return Ok(());
    }

    let tag = sys.frames[id].tag;
    let lower = sys.low_module_serving(target, tag)?;
    let child = sys.request_frame(id, target, lower, tag, RequestDirection::UpDown);
    sys.call(
        Event::WriteRequest(WriteRequestStep::Start),
        child,
        id,
        Event::WriteRequest(WriteRequestStep::UpDownFinish),
    );
    Ok(())
}

fn up_down_finish(sys: &mut System, id: FrameId) {
    let (module, target) = endpoints(sys, id);
    let parent = parent_of(sys, id);
    let (access, addr, tag) = {
        let f = &sys.frames[id];
        (f.id, f.addr, f.tag)
    };
    let (set, way) = sys.frames[id].slot();

    if sys.frames[id].error {
        sys.frames[parent].error = true;
        sys.frames[parent].set_reply_if_higher(Reply::AckError);
        sys.frames[id].reply_size = CONTROL_SIZE;
        sys.unlock_entry(target, set, way, access);
        sys.schedule(Event::WriteRequest(WriteRequestStep::Reply), id, 0);
        return;
    }

    let node = sys.sharer_node(module);
    let upper_bs = sys.modules[module.0].block_size();
    let t = &mut sys.modules[target.0];
    for z in t.sub_blocks_of(tag, addr, upper_bs) {
        t.directory.set_sharer(set, way, z, node);
        t.directory.set_owner(set, way, z, Some(node));
    }
    if t.cache.block(set, way).state != BlockState::Modified {
        t.cache.set_block(set, way, tag, BlockState::Exclusive);
    }
    t.stats.data_accesses += 1;
    let latency = t.data_latency();

    sys.frames[id].reply_size = upper_bs + CONTROL_SIZE;
    sys.frames[parent].set_reply_if_higher(Reply::AckData);
    sys.unlock_entry(target, set, way, access);
    sys.schedule(Event::WriteRequest(WriteRequestStep::Reply), id, latency);
}

fn down_up(sys: &mut System, id: FrameId) {
    let (_, target) = endpoints(sys, id);
    let parent = parent_of(sys, id);
    let access = sys.frames[id].id;
    let (set, way) = sys.frames[id].slot();

    let t = &mut sys.modules[target.0];
    // The own invalidation may have collected dirty data from above.
    let state = t.cache.block(set, way).state;
    let (reply, size) = match state {
        BlockState::Exclusive | BlockState::Shared => (Reply::Ack, CONTROL_SIZE),
        BlockState::Modified | BlockState::Owned | BlockState::NonCoherent => {
            (Reply::AckData, t.block_size() + CONTROL_SIZE)
        }
        BlockState::Invalid => panic!(
            "down-up write request for {:#x} found an invalid block in '{}'",
            sys.frames[id].tag,
            t.name()
        ),
    };
    t.cache.set_state(set, way, BlockState::Invalid);
    if reply == Reply::AckData {
        t.stats.data_accesses += 1;
    }
    let latency = t.data_latency();

    sys.frames[id].reply_size = size;
    sys.frames[parent].set_reply_if_higher(reply);
    sys.unlock_entry(target, set, way, access);
    sys.schedule(Event::WriteRequest(WriteRequestStep::Reply), id, latency);
}

fn reply(sys: &mut System, id: FrameId) {
    let (module, target) = endpoints(sys, id);
    let size = sys.frames[id].reply_size;
    sys.send(
        id,
        target,
        module,
        size,
        Event::WriteRequest(WriteRequestStep::Finish),
        Event::WriteRequest(WriteRequestStep::Reply),
    );
}

fn finish(sys: &mut System, id: FrameId) {
    let (module, target) = endpoints(sys, id);
    sys.receive(id, target, module);

    let parent = parent_of(sys, id);
    if let Some(witness) = sys.frames[id].witness.take() {
        if sys.frames[parent].error {
            sys.frames[parent].witness = Some(witness);
        } else if sys.frames[id].direction == RequestDirection::UpDown {
            witness.increment();
        }
    }
    sys.ret(id);
}
