//! Directory control messages.
//!
//! A message changes only the directory of the module below; no data moves.
//! The lookup there never waits, so a locked entry makes the sender retry.

use crate::common::SimError;
use crate::frame::{FrameId, MessageKind, RequestDirection};
use crate::module::ModuleId;
use crate::sim::System;

use super::{Event, FindAndLockStep, MessageStep};

const CONTROL_SIZE: u64 = 8;

pub(crate) fn handle(sys: &mut System, step: MessageStep, id: FrameId) -> Result<(), SimError> {
    match step {
        MessageStep::Start => {
            let (module, target) = endpoints(sys, id);
            sys.send(
                id,
                module,
                target,
                CONTROL_SIZE,
                Event::Message(MessageStep::Receive),
                Event::Message(MessageStep::Start),
            );
        }
        MessageStep::Receive => receive(sys, id),
        MessageStep::Action => action(sys, id),
        MessageStep::Reply => {
            let (module, target) = endpoints(sys, id);
            sys.send(
                id,
                target,
                module,
                CONTROL_SIZE,
                Event::Message(MessageStep::Finish),
                Event::Message(MessageStep::Reply),
            );
        }
        MessageStep::Finish => {
            let (module, target) = endpoints(sys, id);
            sys.receive(id, target, module);
            sys.ret(id);
        }
    }
    Ok(())
}

fn endpoints(sys: &System, id: FrameId) -> (ModuleId, ModuleId) {
    let f = &sys.frames[id];
    match f.target {
        Some(target) => (f.module, target),
        None => panic!("message A-{} has no target", f.id),
    }
}

fn receive(sys: &mut System, id: FrameId) {
    let (module, target) = endpoints(sys, id);
    sys.receive(id, module, target);

    let mut child = sys.child_frame(id, target, sys.frames[id].addr);
    child.direction = RequestDirection::DownUp;
    child.blocking = false;
    sys.call(
        Event::FindAndLock(FindAndLockStep::Start),
        child,
        id,
        Event::Message(MessageStep::Action),
    );
}

fn action(sys: &mut System, id: FrameId) {
    let (module, target) = endpoints(sys, id);
    let parent = sys.frames[id].parent();

    if sys.frames[id].error {
        if let Some(parent) = parent {
            sys.frames[parent].error = true;
        }
    } else if !sys.frames[id].block_not_found {
        let (access, addr, tag, kind) = {
            let f = &sys.frames[id];
            (f.id, f.addr, f.tag, f.message_kind)
        };
        let (set, way) = sys.frames[id].slot();
        match kind {
            Some(MessageKind::ClearOwner) => {
                let node = sys.sharer_node(module);
                let upper_bs = sys.modules[module.0].block_size();
                let t = &mut sys.modules[target.0];
                for z in t.sub_blocks_of(tag, addr, upper_bs) {
                    if t.directory.entry(set, way, z).owner() == Some(node) {
                        t.directory.set_owner(set, way, z, None);
                    }
                }
            }
            None => panic!("message A-{access} carries no message kind"),
        }
        sys.unlock_entry(target, set, way, access);
    }

    sys.frames[id].reply_size = CONTROL_SIZE;
    sys.schedule(Event::Message(MessageStep::Reply), id, 0);
}
