//! NMOESI Coherence Protocol.
//!
//! Every access kind and protocol sub-operation is a chain of named steps run
//! on one [`Frame`](crate::frame::Frame). A step either schedules another step
//! of the same frame, calls a child chain that resumes the frame at a return
//! step, or returns to its parent. This module defines:
//! 1. **Events:** One step enum per chain, wrapped in [`Event`].
//! 2. **Dispatch:** Routing a continuation to the handler of its chain.
//!
//! Handlers live in one file per chain and share the helpers of
//! [`crate::sim::System`].

/// Eviction of a victim block with write-back to the level below.
pub mod evict;
/// Block lookup with port and directory-entry locking.
pub mod find_and_lock;
/// Flush of one block out of a module and everything above it.
pub mod flush;
/// Invalidation of upper-level sharers.
pub mod invalidate;
/// Coherent load.
pub mod load;
/// Load, store and lookup chains of local memories.
pub mod local;
/// Directory-only control messages.
pub mod message;
/// Non-coherent store.
pub mod nc_store;
/// Non-binding prefetch.
pub mod prefetch;
/// Read request between adjacent levels, in either direction.
pub mod read_request;
/// Coherent store.
pub mod store;
/// Write (exclusive) request between adjacent levels, in either direction.
pub mod write_request;

use std::fmt;

use crate::common::SimError;
use crate::engine::Continuation;
use crate::sim::System;

macro_rules! steps {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $label:literal, )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $(#[$vmeta])* $variant, )+
        }

        impl $name {
            /// Step name as it appears in traces.
            pub const fn name(self) -> &'static str {
                match self {
                    $( Self::$variant => $label, )+
                }
            }
        }
    };
}

steps! {
    /// Steps of a coherent load.
    LoadStep {
        /// Registers the access and tries to coalesce.
        Start => "load",
        /// Waits for older conflicting accesses, then locks the block.
        Lock => "load_lock",
        /// Dispatches on hit or miss.
        Action => "load_action",
        /// Installs the block fetched from below.
        Miss => "load_miss",
        /// Releases the directory entry.
        Unlock => "load_unlock",
        /// Signals the witness and deregisters the access.
        Finish => "load_finish",
    }
}

steps! {
    /// Steps of a coherent store.
    StoreStep {
        /// Registers the access and tries to coalesce.
        Start => "store",
        /// Waits for the previous access, then locks the block.
        Lock => "store_lock",
        /// Requests exclusive permission unless already held.
        Action => "store_action",
        /// Marks the block Modified and releases the entry.
        Unlock => "store_unlock",
        /// Deregisters the access.
        Finish => "store_finish",
    }
}

steps! {
    /// Steps of a non-coherent store.
    NcStoreStep {
        /// Registers the access and tries to coalesce.
        Start => "nc_store",
        /// Waits for the previous access, then locks the block.
        Lock => "nc_store_lock",
        /// Writes dirty coherent data back before going non-coherent.
        Writeback => "nc_store_writeback",
        /// Fetches the block or drops ownership below.
        Action => "nc_store_action",
        /// Checks the fetch result.
        Miss => "nc_store_miss",
        /// Marks the block NonCoherent and releases the entry.
        Unlock => "nc_store_unlock",
        /// Signals the witness and deregisters the access.
        Finish => "nc_store_finish",
    }
}

steps! {
    /// Steps of a prefetch.
    PrefetchStep {
        /// Drops the prefetch if the block is in flight, else registers it.
        Start => "prefetch",
        /// Locks the block without waiting.
        Lock => "prefetch_lock",
        /// Dispatches on hit, miss or conflict.
        Action => "prefetch_action",
        /// Installs the block fetched from below.
        Miss => "prefetch_miss",
        /// Releases the directory entry.
        Unlock => "prefetch_unlock",
        /// Signals the witness and deregisters the access.
        Finish => "prefetch_finish",
    }
}

steps! {
    /// Steps of a flush.
    FlushStep {
        /// Looks the block up without allocating.
        Start => "flush",
        /// Evicts the block if present.
        Action => "flush_action",
        /// Releases the directory entry.
        Unlock => "flush_unlock",
        /// Signals the witness.
        Finish => "flush_finish",
    }
}

steps! {
    /// Steps of a block lookup.
    FindAndLockStep {
        /// Requests a port.
        Start => "find_and_lock",
        /// Looks the block up and locks its directory entry.
        Port => "find_and_lock_port",
        /// Releases the port and evicts the victim on a miss.
        Action => "find_and_lock_action",
        /// Reports the result to the caller.
        Finish => "find_and_lock_finish",
    }
}

steps! {
    /// Steps of an eviction.
    EvictStep {
        /// Invalidates every upper copy of the victim.
        Start => "evict",
        /// Drops clean victims, forwards dirty ones.
        Invalid => "evict_invalid",
        /// Sends the dirty data down.
        Action => "evict_action",
        /// Locks the block below.
        Receive => "evict_receive",
        /// Merges the data into the block below.
        Writeback => "evict_writeback",
        /// Acknowledges the write-back.
        Reply => "evict_reply",
        /// Invalidates the victim once acknowledged.
        ReplyReceive => "evict_reply_receive",
        /// Returns to the caller.
        Finish => "evict_finish",
    }
}

steps! {
    /// Steps of an invalidation.
    InvalidateStep {
        /// Sends a down-up write request to every sharer.
        Start => "invalidate",
        /// Collects the acknowledgements.
        Finish => "invalidate_finish",
    }
}

steps! {
    /// Steps of a read request.
    ReadRequestStep {
        /// Sends the request.
        Start => "read_request",
        /// Locks the block at the target.
        Receive => "read_request_receive",
        /// Dispatches on direction, conflict or missing block.
        Action => "read_request_action",
        /// Serves a request from above, probing owners or fetching from below.
        UpDown => "read_request_updown",
        /// Installs the block fetched from below.
        UpDownMiss => "read_request_updown_miss",
        /// Updates sharers and owner for the requester.
        UpDownFinish => "read_request_updown_finish",
        /// Serves a probe from below, probing owners above first.
        DownUp => "read_request_downup",
        /// Demotes the block and reports what was found.
        DownUpFinish => "read_request_downup_finish",
        /// Sends the reply.
        Reply => "read_request_reply",
        /// Returns to the requester.
        Finish => "read_request_finish",
    }
}

steps! {
    /// Steps of a write request.
    WriteRequestStep {
        /// Sends the request.
        Start => "write_request",
        /// Locks the block at the target.
        Receive => "write_request_receive",
        /// Invalidates the other upper sharers.
        Action => "write_request_action",
        /// Dispatches on direction.
        Exclusive => "write_request_exclusive",
        /// Obtains exclusive permission from below if needed.
        UpDown => "write_request_updown",
        /// Makes the requester the only sharer and owner.
        UpDownFinish => "write_request_updown_finish",
        /// Invalidates the block and reports its data.
        DownUp => "write_request_downup",
        /// Sends the reply.
        Reply => "write_request_reply",
        /// Returns to the requester.
        Finish => "write_request_finish",
    }
}

steps! {
    /// Steps of a directory control message.
    MessageStep {
        /// Sends the message.
        Start => "message",
        /// Locks the block at the target.
        Receive => "message_receive",
        /// Applies the message to the directory.
        Action => "message_action",
        /// Sends the acknowledgement.
        Reply => "message_reply",
        /// Returns to the sender.
        Finish => "message_finish",
    }
}

steps! {
    /// Steps of a local-memory load.
    LocalLoadStep {
        /// Registers the access and tries to coalesce.
        Start => "local_load",
        /// Waits for older conflicting accesses, then locks the block.
        Lock => "local_load_lock",
        /// Retries on conflict.
        Action => "local_load_action",
        /// Releases the directory entry.
        Unlock => "local_load_unlock",
        /// Signals the witness and deregisters the access.
        Finish => "local_load_finish",
    }
}

steps! {
    /// Steps of a local-memory store.
    LocalStoreStep {
        /// Registers the access and tries to coalesce.
        Start => "local_store",
        /// Waits for the previous access, then locks the block.
        Lock => "local_store_lock",
        /// Marks the block Modified.
        Action => "local_store_action",
        /// Releases the directory entry.
        Unlock => "local_store_unlock",
        /// Signals the witness and deregisters the access.
        Finish => "local_store_finish",
    }
}

steps! {
    /// Steps of a local-memory lookup.
    LocalFindAndLockStep {
        /// Requests a port.
        Start => "local_find_and_lock",
        /// Looks the block up and locks its directory entry.
        Port => "local_find_and_lock_port",
        /// Installs missing blocks and reports the result.
        Action => "local_find_and_lock_action",
    }
}

/// A step of any protocol chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Event {
    /// Coherent load.
    Load(LoadStep),
    /// Coherent store.
    Store(StoreStep),
    /// Non-coherent store.
    NcStore(NcStoreStep),
    /// Prefetch.
    Prefetch(PrefetchStep),
    /// Flush.
    Flush(FlushStep),
    /// Block lookup.
    FindAndLock(FindAndLockStep),
    /// Eviction.
    Evict(EvictStep),
    /// Invalidation of upper sharers.
    Invalidate(InvalidateStep),
    /// Read request.
    ReadRequest(ReadRequestStep),
    /// Write request.
    WriteRequest(WriteRequestStep),
    /// Directory control message.
    Message(MessageStep),
    /// Local-memory load.
    LocalLoad(LocalLoadStep),
    /// Local-memory store.
    LocalStore(LocalStoreStep),
    /// Local-memory lookup.
    LocalFindAndLock(LocalFindAndLockStep),
}

impl Event {
    /// Step name as it appears in traces.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Load(s) => s.name(),
            Self::Store(s) => s.name(),
            Self::NcStore(s) => s.name(),
            Self::Prefetch(s) => s.name(),
            Self::Flush(s) => s.name(),
            Self::FindAndLock(s) => s.name(),
            Self::Evict(s) => s.name(),
            Self::Invalidate(s) => s.name(),
            Self::ReadRequest(s) => s.name(),
            Self::WriteRequest(s) => s.name(),
            Self::Message(s) => s.name(),
            Self::LocalLoad(s) => s.name(),
            Self::LocalStore(s) => s.name(),
            Self::LocalFindAndLock(s) => s.name(),
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Runs one step.
pub(crate) fn dispatch(sys: &mut System, cont: Continuation) -> Result<(), SimError> {
    let id = cont.frame;
    match cont.event {
        Event::Load(step) => load::handle(sys, step, id),
        Event::Store(step) => store::handle(sys, step, id),
        Event::NcStore(step) => nc_store::handle(sys, step, id),
        Event::Prefetch(step) => prefetch::handle(sys, step, id),
        Event::Flush(step) => flush::handle(sys, step, id),
        Event::FindAndLock(step) => find_and_lock::handle(sys, step, id),
        Event::Evict(step) => evict::handle(sys, step, id),
        Event::Invalidate(step) => invalidate::handle(sys, step, id),
        Event::ReadRequest(step) => read_request::handle(sys, step, id),
        Event::WriteRequest(step) => write_request::handle(sys, step, id),
        Event::Message(step) => message::handle(sys, step, id),
        Event::LocalLoad(step) => local::handle_load(sys, step, id),
        Event::LocalStore(step) => local::handle_store(sys, step, id),
        Event::LocalFindAndLock(step) => local::handle_find_and_lock(sys, step, id),
    }
}
