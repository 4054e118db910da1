//! Eviction of a block towards the level below.
//!
//! The caller holds the directory entry of the block and passes its set and
//! way. Every upper copy is invalidated first; collected dirty data makes the
//! block Modified. Clean blocks are then dropped silently, dirty ones are
//! written back and merged into the lower module's copy, which must exist by
//! inclusion. On a conflict below the caller's `error` flag is raised and the
//! block is left untouched.

use crate::cache::BlockState;
use crate::common::SimError;
use crate::config::ModuleKind;
use crate::frame::{FrameId, RequestDirection};
use crate::sim::System;

use super::{EvictStep, Event, FindAndLockStep, InvalidateStep};

const ACK_SIZE: u64 = 8;

pub(crate) fn handle(sys: &mut System, step: EvictStep, id: FrameId) -> Result<(), SimError> {
    match step {
        EvictStep::Start => start(sys, id)?,
        EvictStep::Invalid => invalid(sys, id),
        EvictStep::Action => action(sys, id),
        EvictStep::Receive => receive(sys, id),
        EvictStep::Writeback => writeback(sys, id),
        EvictStep::Reply => reply(sys, id),
        EvictStep::ReplyReceive => reply_receive(sys, id),
        EvictStep::Finish => sys.ret(id),
    }
    Ok(())
}

fn start(sys: &mut System, id: FrameId) -> Result<(), SimError> {
    let module = sys.frames[id].module;
    let (set, way) = sys.frames[id].slot();
    let block = *sys.modules[module.0].cache.block(set, way);
    let target = match sys.modules[module.0].kind() {
        ModuleKind::MainMemory => None,
        _ => Some(sys.low_module_serving(module, block.tag)?),
    };
    {
        let f = &mut sys.frames[id];
        f.tag = block.tag;
        f.state = block.state;
        f.src_set = set;
        f.src_way = way;
        f.src_tag = block.tag;
        f.target = target;
        f.error = false;
    }

    let mut child = sys.child_frame(id, module, block.tag);
    child.set = set;
    child.way = Some(way);
    sys.call(
        Event::Invalidate(InvalidateStep::Start),
        child,
        id,
        Event::Evict(EvictStep::Invalid),
    );
    Ok(())
}

fn invalid(sys: &mut System, id: FrameId) {
    let module = sys.frames[id].module;
    let (set, way) = (sys.frames[id].src_set, sys.frames[id].src_way);
    let m = &mut sys.modules[module.0];
    let state = m.cache.block(set, way).state;
    sys.frames[id].state = state;

    if m.kind() == ModuleKind::MainMemory {
        m.cache.set_state(set, way, BlockState::Invalid);
        sys.schedule(Event::Evict(EvictStep::Finish), id, 0);
        return;
    }

    match state {
        BlockState::Invalid => sys.schedule(Event::Evict(EvictStep::Finish), id, 0),
        BlockState::Shared | BlockState::Exclusive => {
            m.cache.set_state(set, way, BlockState::Invalid);
            sys.schedule(Event::Evict(EvictStep::Finish), id, 0);
        }
        BlockState::Modified | BlockState::Owned | BlockState::NonCoherent => {
            sys.frames[id].src_state = state;
            sys.schedule(Event::Evict(EvictStep::Action), id, 0);
        }
    }
}

fn target_of(sys: &System, id: FrameId) -> crate::module::ModuleId {
    match sys.frames[id].target {
        Some(target) => target,
        None => panic!("evict A-{} has no target", sys.frames[id].id),
    }
}

fn action(sys: &mut System, id: FrameId) {
    let module = sys.frames[id].module;
    let target = target_of(sys, id);
    let size = sys.modules[module.0].block_size() + ACK_SIZE;
    sys.send(
        id,
        module,
        target,
        size,
        Event::Evict(EvictStep::Receive),
        Event::Evict(EvictStep::Action),
    );
}

fn receive(sys: &mut System, id: FrameId) {
    let module = sys.frames[id].module;
    let target = target_of(sys, id);
    sys.receive(id, module, target);

    let mut child = sys.child_frame(id, target, sys.frames[id].src_tag);
    child.direction = RequestDirection::DownUp;
    child.blocking = false;
    child.write = true;
    sys.call(
        Event::FindAndLock(FindAndLockStep::Start),
        child,
        id,
        Event::Evict(EvictStep::Writeback),
    );
}

fn writeback(sys: &mut System, id: FrameId) {
    if sys.frames[id].error {
        sys.schedule(Event::Evict(EvictStep::Reply), id, 0);
        return;
    }

    let (access, module, src_tag, src_state, tag, state) = {
        let f = &sys.frames[id];
        (f.id, f.module, f.src_tag, f.src_state, f.tag, f.state)
    };
    let target = target_of(sys, id);
    if sys.frames[id].block_not_found {
        panic!(
            "write-back of {src_tag:#x} from '{}' found no block in '{}'",
            sys.modules[module.0].name(),
            sys.modules[target.0].name()
        );
    }

    let merged = match (src_state, state) {
        (BlockState::NonCoherent, BlockState::Exclusive) => BlockState::Modified,
        (BlockState::NonCoherent, BlockState::Shared | BlockState::NonCoherent) => BlockState::NonCoherent,
        (_, BlockState::Exclusive) => BlockState::Modified,
        (_, BlockState::Modified | BlockState::Owned) => state,
        _ => panic!(
            "write-back of {src_state} block {src_tag:#x} from '{}' into {state} block of '{}'",
            sys.modules[module.0].name(),
            sys.modules[target.0].name()
        ),
    };

    let (set, way) = sys.frames[id].slot();
    let node = sys.sharer_node(module);
    let upper_bs = sys.modules[module.0].block_size();
    let t = &mut sys.modules[target.0];
    t.cache.set_state(set, way, merged);
    for z in t.sub_blocks_of(tag, src_tag, upper_bs) {
        t.directory.clear_sharer(set, way, z, node);
        if t.directory.entry(set, way, z).owner() == Some(node) {
            t.directory.set_owner(set, way, z, None);
        }
    }
    t.stats.data_accesses += 1;
    let latency = t.data_latency();
    sys.unlock_entry(target, set, way, access);
    sys.schedule(Event::Evict(EvictStep::Reply), id, latency);
}

fn reply(sys: &mut System, id: FrameId) {
    let module = sys.frames[id].module;
    let target = target_of(sys, id);
    sys.send(
        id,
        target,
        module,
        ACK_SIZE,
        Event::Evict(EvictStep::ReplyReceive),
        Event::Evict(EvictStep::Reply),
    );
}

fn reply_receive(sys: &mut System, id: FrameId) {
    let module = sys.frames[id].module;
    let target = target_of(sys, id);
    sys.receive(id, target, module);

    if sys.frames[id].error {
        if let Some(parent) = sys.frames[id].parent() {
            sys.frames[parent].error = true;
        }
    } else {
        let (set, way) = (sys.frames[id].src_set, sys.frames[id].src_way);
        sys.modules[module.0].cache.set_state(set, way, BlockState::Invalid);
    }
    sys.schedule(Event::Evict(EvictStep::Finish), id, 0);
}
