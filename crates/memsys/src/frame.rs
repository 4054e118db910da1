//! Access Frames and Their Arena.
//!
//! A frame carries the mutable state of one logical access or protocol
//! sub-operation through its event chain. It provides:
//! 1. **Identity:** The access id (shared by every frame of one access), owning and target modules.
//! 2. **Coalescing Links:** Master frame and the continuations waiting for this frame to finish.
//! 3. **Protocol Scratch:** Set/way/tag/state, reply accumulator, pending counter, witness.
//!
//! Frames live in a [`FrameArena`]; a child frame is released when its chain
//! returns to the parent.

use std::ops::{Index, IndexMut};

use crate::cache::BlockState;
use crate::common::{AccessKind, Address, Witness};
use crate::engine::Continuation;
use crate::module::ModuleId;
use crate::network::Message;
use crate::protocol::Event;

/// Identifier of an access, shared by all frames working on its behalf.
pub type AccessId = u64;

/// Handle of a frame in the arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(pub(crate) usize);

impl FrameId {
    /// Slot index in the arena.
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Direction of a request relative to the processor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RequestDirection {
    /// Towards main memory (demand misses).
    #[default]
    UpDown,
    /// Towards the processor (probes, invalidations).
    DownUp,
}

/// Reply accumulated by a request; higher variants win.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Reply {
    /// Nothing received yet.
    #[default]
    None,
    /// Acknowledgement without data.
    Ack,
    /// Acknowledgement carrying the block.
    AckData,
    /// The request could not be served; the requester must retry.
    AckError,
}

/// Directory-only control messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageKind {
    /// Drop the sender's ownership of the block without invalidating it.
    ClearOwner,
}

/// State of one access or protocol sub-operation.
#[derive(Debug, Default)]
pub struct Frame {
    /// Access id.
    pub id: AccessId,
    /// Module the chain runs on.
    pub module: ModuleId,
    /// Module a request is sent to.
    pub target: Option<ModuleId>,
    /// Address accessed.
    pub addr: Address,
    /// Kind of a top-level access; `None` for protocol sub-operations.
    pub access: Option<AccessKind>,
    /// Request direction.
    pub direction: RequestDirection,

    /// Wait for locked directory entries instead of failing.
    pub blocking: bool,
    /// The lookup is on behalf of a read.
    pub read: bool,
    /// The lookup is on behalf of a write.
    pub write: bool,
    /// The request is on behalf of a non-coherent store.
    pub nc_write: bool,
    /// The access is a retry after a conflict.
    pub retry: bool,
    /// The last sub-operation failed with a conflict.
    pub error: bool,
    /// The lookup hit.
    pub hit: bool,
    /// The block is (or will be) held by more than one upper module.
    pub shared: bool,
    /// A down-up lookup found no block.
    pub block_not_found: bool,
    /// A port is held on behalf of this access.
    pub port_locked: bool,
    /// The lookup evicted a victim.
    pub eviction: bool,
    /// A down-up probe kept the block Owned; the requester must not drop the owner.
    pub retain_owner: bool,
    /// The frame was coalesced onto another access.
    pub coalesced: bool,

    /// Access this one was coalesced onto.
    pub master: Option<FrameId>,
    /// Continuations resumed when this frame finishes.
    pub waiters: Vec<Continuation>,
    /// Port held by a lookup.
    pub port: Option<usize>,

    /// Reply received from the target.
    pub reply: Reply,
    /// Size in bytes of the reply to send.
    pub reply_size: u64,
    /// Control message carried by a `message` chain.
    pub message_kind: Option<MessageKind>,

    /// Set of the block.
    pub set: usize,
    /// Way of the block, once known.
    pub way: Option<usize>,
    /// Tag of the block.
    pub tag: Address,
    /// State of the block.
    pub state: BlockState,
    /// Set of the block being evicted.
    pub src_set: usize,
    /// Way of the block being evicted.
    pub src_way: usize,
    /// Tag of the block being evicted.
    pub src_tag: Address,
    /// State of the block being evicted when its data left the module.
    pub src_state: BlockState,

    /// Outstanding child chains.
    pub pending: usize,
    /// Upper module excluded from an invalidation.
    pub except: Option<ModuleId>,
    /// Caller's completion counter.
    pub witness: Option<Witness>,
    /// Network message in flight.
    pub message: Option<Message>,

    parent: Option<FrameId>,
    return_event: Option<Event>,
}

impl Frame {
    /// Creates a frame for access `id` running on `module`.
    pub fn new(id: AccessId, module: ModuleId, addr: Address) -> Self {
        Self {
            id,
            module,
            addr,
            ..Self::default()
        }
    }

    /// Parent frame, for frames started with a call.
    pub const fn parent(&self) -> Option<FrameId> {
        self.parent
    }

    /// Event the parent resumes at when this frame returns.
    pub const fn return_event(&self) -> Option<Event> {
        self.return_event
    }

    /// Set and way of the block.
    ///
    /// # Panics
    ///
    /// Panics if no way was assigned yet; the protocol only asks after a lookup.
    pub fn slot(&self) -> (usize, usize) {
        match self.way {
            Some(way) => (self.set, way),
            None => panic!("frame A-{} has no block assigned", self.id),
        }
    }

    /// Records `reply` unless a stronger reply was already received.
    pub fn set_reply_if_higher(&mut self, reply: Reply) {
        self.reply = self.reply.max(reply);
    }
}

/// Slab of frames with slot reuse.
#[derive(Debug, Default)]
pub struct FrameArena {
    slots: Vec<Option<Frame>>,
    free: Vec<usize>,
}

impl FrameArena {
    /// Creates an empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a top-level frame.
    pub fn alloc(&mut self, frame: Frame) -> FrameId {
        if let Some(idx) = self.free.pop() {
            self.slots[idx] = Some(frame);
            FrameId(idx)
        } else {
            self.slots.push(Some(frame));
            FrameId(self.slots.len() - 1)
        }
    }

    /// Stores a child frame that resumes `parent` at `return_event` when it returns.
    pub fn alloc_child(&mut self, mut frame: Frame, parent: FrameId, return_event: Event) -> FrameId {
        frame.parent = Some(parent);
        frame.return_event = Some(return_event);
        self.alloc(frame)
    }

    /// Removes a frame and returns it.
    ///
    /// # Panics
    ///
    /// Panics if the slot is already free.
    pub fn release(&mut self, id: FrameId) -> Frame {
        match self.slots[id.0].take() {
            Some(frame) => {
                self.free.push(id.0);
                frame
            }
            None => panic!("frame slot {} released twice", id.0),
        }
    }

    /// Returns the frame if it is still alive.
    pub fn get(&self, id: FrameId) -> Option<&Frame> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    /// Number of live frames.
    pub fn live(&self) -> usize {
        self.slots.len() - self.free.len()
    }
}

impl Index<FrameId> for FrameArena {
    type Output = Frame;

    fn index(&self, id: FrameId) -> &Frame {
        match self.slots.get(id.0).and_then(Option::as_ref) {
            Some(frame) => frame,
            None => panic!("frame slot {} is not live", id.0),
        }
    }
}

impl IndexMut<FrameId> for FrameArena {
    fn index_mut(&mut self, id: FrameId) -> &mut Frame {
        match self.slots.get_mut(id.0).and_then(Option::as_mut) {
            Some(frame) => frame,
            None => panic!("frame slot {} is not live", id.0),
        }
    }
}
