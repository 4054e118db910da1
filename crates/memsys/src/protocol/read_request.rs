//! Read requests between adjacent levels.
//!
//! Up-down, the requester asks the module below for a readable copy. On a hit
//! the target first probes the current owners of the block with down-up read
//! requests so that dirty data is collected; on a miss it fetches the block
//! from its own lower level. The requester becomes a sharer, and the owner too
//! when nobody else holds the block.
//!
//! Down-up, the module below probes an upper module: the target probes its own
//! owners, then demotes its block. Dirty blocks become Owned and keep the
//! ownership (`retain_owner`), non-coherent ones become Shared after handing
//! the data over, clean ones become Shared.

use crate::cache::BlockState;
use crate::common::SimError;
use crate::config::ModuleKind;
use crate::frame::{FrameId, Reply, RequestDirection};
use crate::module::ModuleId;
use crate::sim::System;

use super::{Event, FindAndLockStep, ReadRequestStep};

const CONTROL_SIZE: u64 = 8;

pub(crate) fn handle(sys: &mut System, step: ReadRequestStep, id: FrameId) -> Result<(), SimError> {
    match step {
        ReadRequestStep::Start => start(sys, id),
        ReadRequestStep::Receive => receive(sys, id),
        ReadRequestStep::Action => action(sys, id),
        ReadRequestStep::UpDown => up_down(sys, id)?,
        ReadRequestStep::UpDownMiss => up_down_miss(sys, id),
        ReadRequestStep::UpDownFinish => up_down_finish(sys, id),
        ReadRequestStep::DownUp => down_up(sys, id),
        ReadRequestStep::DownUpFinish => down_up_finish(sys, id),
        ReadRequestStep::Reply => reply(sys, id),
        ReadRequestStep::Finish => finish(sys, id),
    }
    Ok(())
}

fn endpoints(sys: &System, id: FrameId) -> (ModuleId, ModuleId) {
    let f = &sys.frames[id];
    match f.target {
        Some(target) => (f.module, target),
        None => panic!("read_request A-{} has no target", f.id),
    }
}

fn parent_of(sys: &System, id: FrameId) -> FrameId {
    match sys.frames[id].parent() {
        Some(parent) => parent,
        None => panic!("read_request A-{} has no caller", sys.frames[id].id),
    }
}

fn start(sys: &mut System, id: FrameId) {
    let (module, target) = endpoints(sys, id);
    sys.send(
        id,
        module,
        target,
        CONTROL_SIZE,
        Event::ReadRequest(ReadRequestStep::Receive),
        Event::ReadRequest(ReadRequestStep::Start),
    );
}

fn receive(sys: &mut System, id: FrameId) {
    let (module, target) = endpoints(sys, id);
    sys.receive(id, module, target);

    let (direction, nc_write) = (sys.frames[id].direction, sys.frames[id].nc_write);
    let mut child = sys.child_frame(id, target, sys.frames[id].addr);
    child.direction = direction;
    child.blocking = direction == RequestDirection::DownUp;
    child.read = true;
    child.nc_write = nc_write;
    sys.call(
        Event::FindAndLock(FindAndLockStep::Start),
        child,
        id,
        Event::ReadRequest(ReadRequestStep::Action),
    );
}

fn action(sys: &mut System, id: FrameId) {
    let parent = parent_of(sys, id);

    if sys.frames[id].error {
        sys.frames[parent].error = true;
        sys.frames[parent].set_reply_if_higher(Reply::AckError);
        sys.frames[id].reply_size = CONTROL_SIZE;
        sys.schedule(Event::ReadRequest(ReadRequestStep::Reply), id, 0);
        return;
    }

    if sys.frames[id].block_not_found {
        sys.frames[parent].set_reply_if_higher(Reply::Ack);
        sys.frames[id].reply_size = CONTROL_SIZE;
        sys.schedule(Event::ReadRequest(ReadRequestStep::Reply), id, 0);
        return;
    }

    let next = match sys.frames[id].direction {
        RequestDirection::UpDown => ReadRequestStep::UpDown,
        RequestDirection::DownUp => ReadRequestStep::DownUp,
    };
    sys.schedule(Event::ReadRequest(next), id, 0);
}

/// Sends a down-up read request to every owner of the target's block,
/// skipping `skip` and owners whose block does not start at the sub-block.
///
/// # Returns
///
/// The number of probes sent.
fn probe_owners(sys: &mut System, id: FrameId, target: ModuleId, skip: Option<ModuleId>, resume: ReadRequestStep) -> usize {
    let (set, way) = sys.frames[id].slot();
    let tag = sys.frames[id].tag;
    let num_sub_blocks = sys.modules[target.0].directory.num_sub_blocks();
    let mut sent = 0;
    for z in 0..num_sub_blocks {
        let Some(node) = sys.modules[target.0].directory.entry(set, way, z).owner() else {
            continue;
        };
        let owner = sys.node_module(target, node);
        if Some(owner) == skip {
            continue;
        }
        let sub_tag = sys.modules[target.0].sub_block_tag(tag, z);
        if sub_tag % sys.modules[owner.0].block_size() != 0 {
            continue;
        }
        sent += 1;
        let child = sys.request_frame(id, target, owner, sub_tag, RequestDirection::DownUp);
        sys.call(Event::ReadRequest(ReadRequestStep::Start), child, id, Event::ReadRequest(resume));
    }
    sent
}

fn up_down(sys: &mut System, id: FrameId) -> Result<(), SimError> {
    let (module, target) = endpoints(sys, id);
    sys.frames[id].pending = 1;

    let state = sys.frames[id].state;
    if state.is_valid() || sys.modules[target.0].kind() == ModuleKind::MainMemory {
        let sent = probe_owners(sys, id, target, Some(module), ReadRequestStep::UpDownFinish);
        sys.frames[id].pending += sent;
        sys.schedule(Event::ReadRequest(ReadRequestStep::UpDownFinish), id, 0);
        return Ok(());
    }

    let tag = sys.frames[id].tag;
    let lower = sys.low_module_serving(target, tag)?;
    let child = sys.request_frame(id, target, lower, tag, RequestDirection::UpDown);
    sys.call(
        Event::ReadRequest(ReadRequestStep::Start),
        child,
        id,
        Event::ReadRequest(ReadRequestStep::UpDownMiss),
    );
    Ok(())
}

fn up_down_miss(sys: &mut System, id: FrameId) {
    let (_, target) = endpoints(sys, id);
    let parent = parent_of(sys, id);
    let (access, tag, shared) = {
        let f = &sys.frames[id];
        (f.id, f.tag, f.shared)
    };
    let (set, way) = sys.frames[id].slot();

    if sys.frames[id].error {
        sys.unlock_entry(target, set, way, access);
        sys.frames[parent].error = true;
        sys.frames[parent].set_reply_if_higher(Reply::AckError);
        sys.frames[id].reply_size = CONTROL_SIZE;
        sys.schedule(Event::ReadRequest(ReadRequestStep::Reply), id, 0);
        return;
    }

    let state = if shared { BlockState::Shared } else { BlockState::Exclusive };
    sys.modules[target.0].cache.set_block(set, way, tag, state);
    let f = &mut sys.frames[id];
    f.state = state;
    // The fill reply is not data collected from owners above.
    f.reply = Reply::None;
    sys.schedule(Event::ReadRequest(ReadRequestStep::UpDownFinish), id, 0);
}

fn up_down_finish(sys: &mut System, id: FrameId) {
    {
        let f = &mut sys.frames[id];
        f.pending -= 1;
        if f.pending > 0 {
            return;
        }
    }

    let (module, target) = endpoints(sys, id);
    let parent = parent_of(sys, id);
    let (access, addr, tag, nc_write, below_shared, retain_owner, probed_data) = {
        let f = &sys.frames[id];
        (f.id, f.addr, f.tag, f.nc_write, f.shared, f.retain_owner, f.reply == Reply::AckData)
    };
    let (set, way) = sys.frames[id].slot();
    let node = sys.sharer_node(module);
    let upper_bs = sys.modules[module.0].block_size();

    let t = &mut sys.modules[target.0];
    if !retain_owner {
        for z in 0..t.directory.num_sub_blocks() {
            if t.directory.entry(set, way, z).owner().is_some_and(|o| o != node) {
                t.directory.set_owner(set, way, z, None);
            }
        }
    }

    let mut state = t.cache.block(set, way).state;
    if probed_data && !retain_owner && state == BlockState::Exclusive {
        state = BlockState::Modified;
        t.cache.set_state(set, way, state);
    }

    let range = t.sub_blocks_of(tag, addr, upper_bs);
    let mut shared = nc_write
        || below_shared
        || matches!(state, BlockState::Owned | BlockState::NonCoherent | BlockState::Shared);
    for z in range.clone() {
        t.directory.set_sharer(set, way, z, node);
        shared |= t.directory.entry(set, way, z).num_sharers() > 1;
    }
    if !shared {
        for z in range {
            t.directory.set_owner(set, way, z, Some(node));
        }
    }
    t.stats.data_accesses += 1;
    let latency = t.data_latency();

    sys.frames[id].reply_size = upper_bs + CONTROL_SIZE;
    let p = &mut sys.frames[parent];
    p.shared = shared;
    p.set_reply_if_higher(Reply::AckData);
    sys.unlock_entry(target, set, way, access);
    sys.schedule(Event::ReadRequest(ReadRequestStep::Reply), id, latency);
}

fn down_up(sys: &mut System, id: FrameId) {
    let (_, target) = endpoints(sys, id);
    sys.frames[id].pending = 1;
    let sent = probe_owners(sys, id, target, None, ReadRequestStep::DownUpFinish);
    sys.frames[id].pending += sent;
    sys.schedule(Event::ReadRequest(ReadRequestStep::DownUpFinish), id, 0);
}

fn down_up_finish(sys: &mut System, id: FrameId) {
    {
        let f = &mut sys.frames[id];
        f.pending -= 1;
        if f.pending > 0 {
            return;
        }
    }

    let (_, target) = endpoints(sys, id);
    let parent = parent_of(sys, id);
    let (access, tag, retained_above, data_above) = {
        let f = &sys.frames[id];
        (f.id, f.tag, f.retain_owner, f.reply == Reply::AckData)
    };
    let (set, way) = sys.frames[id].slot();

    let t = &mut sys.modules[target.0];
    let state = t.cache.block(set, way).state;
    let (next, reply, retain) = match state {
        BlockState::Invalid => panic!(
            "down-up read request for {tag:#x} found an invalid block in '{}'",
            t.name()
        ),
        BlockState::NonCoherent => (BlockState::Shared, Reply::AckData, false),
        BlockState::Modified | BlockState::Owned => (BlockState::Owned, Reply::AckData, true),
        _ if data_above => (BlockState::Owned, Reply::AckData, true),
        BlockState::Exclusive | BlockState::Shared => (BlockState::Shared, Reply::Ack, false),
    };
    t.cache.set_state(set, way, next);
    if !retained_above {
        for z in 0..t.directory.num_sub_blocks() {
            t.directory.set_owner(set, way, z, None);
        }
    }
    let size = match reply {
        Reply::AckData => {
            t.stats.data_accesses += 1;
            t.block_size() + CONTROL_SIZE
        }
        _ => CONTROL_SIZE,
    };
    let latency = t.data_latency();

    sys.frames[id].reply_size = size;
    let p = &mut sys.frames[parent];
    p.set_reply_if_higher(reply);
    p.retain_owner |= retain;
    sys.unlock_entry(target, set, way, access);
    sys.schedule(Event::ReadRequest(ReadRequestStep::Reply), id, latency);
}

fn reply(sys: &mut System, id: FrameId) {
    let (module, target) = endpoints(sys, id);
    let size = sys.frames[id].reply_size;
    sys.send(
        id,
        target,
        module,
        size,
        Event::ReadRequest(ReadRequestStep::Finish),
        Event::ReadRequest(ReadRequestStep::Reply),
    );
}

fn finish(sys: &mut System, id: FrameId) {
    let (module, target) = endpoints(sys, id);
    sys.receive(id, target, module);
    sys.ret(id);
}
