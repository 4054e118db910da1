//! Invalidation of the upper copies of a block.
//!
//! Every sharer of every sub-block, except the optional `except` module, is
//! dropped from the directory and sent a down-up write request. Requests go
//! only to sharers whose own block starts at the sub-block, so an upper module
//! with blocks spanning several sub-blocks is asked once. If any of them
//! answers with data the block becomes Modified.

use crate::cache::BlockState;
use crate::common::SimError;
use crate::frame::{FrameId, Reply, RequestDirection};
use crate::sim::System;

use super::{Event, InvalidateStep, WriteRequestStep};

pub(crate) fn handle(sys: &mut System, step: InvalidateStep, id: FrameId) -> Result<(), SimError> {
    match step {
        InvalidateStep::Start => start(sys, id),
        InvalidateStep::Finish => finish(sys, id),
    }
    Ok(())
}

fn start(sys: &mut System, id: FrameId) {
    let module = sys.frames[id].module;
    let except = sys.frames[id].except;
    let (set, way) = sys.frames[id].slot();
    let block = *sys.modules[module.0].cache.block(set, way);
    {
        let f = &mut sys.frames[id];
        f.tag = block.tag;
        f.state = block.state;
        f.pending = 1;
    }

    let num_sub_blocks = sys.modules[module.0].directory.num_sub_blocks();
    for z in 0..num_sub_blocks {
        let sub_tag = sys.modules[module.0].sub_block_tag(block.tag, z);
        let sharers: Vec<usize> = sys.modules[module.0].directory.sharers(set, way, z).collect();
        for node in sharers {
            let sharer = sys.node_module(module, node);
            if Some(sharer) == except {
                continue;
            }
            let dir = &mut sys.modules[module.0].directory;
            dir.clear_sharer(set, way, z, node);
            if dir.entry(set, way, z).owner() == Some(node) {
                dir.set_owner(set, way, z, None);
            }
            if sub_tag % sys.modules[sharer.0].block_size() != 0 {
                continue;
            }
            sys.frames[id].pending += 1;
            let child = sys.request_frame(id, module, sharer, sub_tag, RequestDirection::DownUp);
            sys.call(
                Event::WriteRequest(WriteRequestStep::Start),
                child,
                id,
                Event::Invalidate(InvalidateStep::Finish),
            );
        }
    }
    sys.schedule(Event::Invalidate(InvalidateStep::Finish), id, 0);
}

fn finish(sys: &mut System, id: FrameId) {
    let f = &mut sys.frames[id];
    f.pending -= 1;
    if f.pending > 0 {
        return;
    }
    if f.reply == Reply::AckData && f.state.is_valid() {
        let (set, way) = f.slot();
        let module = f.module;
        sys.modules[module.0].cache.set_state(set, way, BlockState::Modified);
    }
    sys.ret(id);
}
