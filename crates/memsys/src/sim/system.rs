//! The Memory System.
//!
//! [`System`] owns every module and network of a hierarchy together with the
//! frame arena and the event queue. It provides:
//! 1. **Wiring:** Adding modules and networks and connecting them.
//! 2. **Access Issue:** Starting loads, stores, non-coherent stores, prefetches and flushes.
//! 3. **Execution:** Running the event queue step by step, to a cycle or to completion.
//! 4. **Inspection:** Block states, sharers, owners and statistics.
//!
//! The `pub(crate)` helpers at the bottom are the vocabulary of the protocol
//! handlers: scheduling, call and return, port and entry locking, and message
//! routing between adjacent levels.

use tracing::{debug, trace};

use crate::cache::BlockState;
use crate::common::{AccessKind, Address, SimError, Witness, XorShift64};
use crate::config::ModuleKind;
use crate::engine::{Continuation, EventQueue};
use crate::frame::{AccessId, Frame, FrameArena, FrameId, RequestDirection};
use crate::module::{Module, ModuleId, NetworkLink};
use crate::network::{Network, NetworkId, NodeId};
use crate::protocol::{
    self, Event, FlushStep, LoadStep, LocalLoadStep, LocalStoreStep, NcStoreStep, PrefetchStep,
    StoreStep,
};
use crate::stats::{ModuleReport, NetworkReport, NodeReport, SimStats};

/// A wired memory hierarchy and its running accesses.
#[derive(Debug)]
pub struct System {
    pub(crate) modules: Vec<Module>,
    pub(crate) networks: Vec<Box<dyn Network>>,
    pub(crate) frames: FrameArena,
    pub(crate) engine: EventQueue,
    pub(crate) rng: XorShift64,
    next_access_id: AccessId,
    completed: Vec<AccessId>,
    accesses_issued: u64,
    accesses_completed: u64,
}

impl System {
    /// Creates an empty system.
    ///
    /// # Arguments
    ///
    /// * `seed` - Seed of the retry-jitter generator.
    pub fn new(seed: u64) -> Self {
        Self {
            modules: Vec::new(),
            networks: Vec::new(),
            frames: FrameArena::new(),
            engine: EventQueue::new(),
            rng: XorShift64::new(seed),
            next_access_id: 1,
            completed: Vec::new(),
            accesses_issued: 0,
            accesses_completed: 0,
        }
    }

    /// Adds a module.
    pub fn add_module(&mut self, module: Module) -> ModuleId {
        self.modules.push(module);
        ModuleId(self.modules.len() - 1)
    }

    /// Adds a network.
    pub fn add_network(&mut self, network: Box<dyn Network>) -> NetworkId {
        self.networks.push(network);
        NetworkId(self.networks.len() - 1)
    }

    /// Attaches `module` to `network` as its link towards main memory.
    pub fn set_low_network(&mut self, module: ModuleId, network: NetworkId) {
        let node = self.attach(module, network);
        self.modules[module.0].set_low_network(NetworkLink { network, node });
    }

    /// Attaches `module` to `network` as its link towards the processor.
    pub fn set_high_network(&mut self, module: ModuleId, network: NetworkId) {
        let node = self.attach(module, network);
        self.modules[module.0].set_high_network(NetworkLink { network, node });
    }

    fn attach(&mut self, module: ModuleId, network: NetworkId) -> NodeId {
        let name = self.modules[module.0].name().to_string();
        self.networks[network.0].add_node(&name, module)
    }

    /// Declares `lower` as a module directly below `upper`.
    pub fn connect(&mut self, upper: ModuleId, lower: ModuleId) {
        self.modules[upper.0].add_low_module(lower);
        self.modules[lower.0].add_high_module(upper);
    }

    /// Sizes every directory for the upper modules and network wired so far.
    ///
    /// Must run after the last `connect`/`set_high_network` and before the
    /// first access.
    pub fn finalize(&mut self) {
        for idx in 0..self.modules.len() {
            let module = &self.modules[idx];
            let sub_block_size = module
                .high_modules()
                .iter()
                .map(|id| self.modules[id.0].block_size())
                .min()
                .unwrap_or(module.block_size());
            let num_nodes = module
                .high_link()
                .map_or(1, |link| self.networks[link.network.0].num_nodes());
            self.modules[idx].finalize_directory(sub_block_size, num_nodes);
        }
    }

    /// All modules, in insertion order.
    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    /// One module.
    pub fn module(&self, id: ModuleId) -> &Module {
        &self.modules[id.0]
    }

    /// Looks a module up by name.
    pub fn module_id(&self, name: &str) -> Option<ModuleId> {
        self.modules.iter().position(|m| m.name() == name).map(ModuleId)
    }

    /// Looks a module up by name.
    pub fn module_by_name(&self, name: &str) -> Option<&Module> {
        self.module_id(name).map(|id| self.module(id))
    }

    /// One network.
    pub fn network(&self, id: NetworkId) -> &dyn Network {
        self.networks[id.0].as_ref()
    }

    /// Number of networks.
    pub fn num_networks(&self) -> usize {
        self.networks.len()
    }

    /// Current simulated cycle.
    pub const fn now(&self) -> u64 {
        self.engine.now()
    }

    /// True when no event is pending.
    pub fn is_idle(&self) -> bool {
        self.engine.is_empty()
    }

    /// Number of frames alive, top-level accesses and sub-operations alike.
    pub fn live_frames(&self) -> usize {
        self.frames.live()
    }

    /// Checks whether `module` accepts a new access this cycle.
    pub fn can_access(&self, module: ModuleId) -> bool {
        self.modules[module.0].can_access()
    }

    /// Issues an access.
    ///
    /// The first step is scheduled for the current cycle; nothing runs until
    /// the queue is stepped.
    ///
    /// # Arguments
    ///
    /// * `module` - Module receiving the access.
    /// * `kind` - Access kind.
    /// * `addr` - Accessed address.
    /// * `witness` - Counter incremented once when the access completes.
    ///
    /// # Returns
    ///
    /// The id of the new access, or `SimError::UnsupportedAccess` for a
    /// flush on a local memory.
    pub fn access(
        &mut self,
        module: ModuleId,
        kind: AccessKind,
        addr: Address,
        witness: Option<&Witness>,
    ) -> Result<AccessId, SimError> {
        let target = &self.modules[module.0];
        let event = match (target.kind(), kind) {
            (ModuleKind::LocalMemory, AccessKind::Load | AccessKind::Prefetch) => {
                Event::LocalLoad(LocalLoadStep::Start)
            }
            (ModuleKind::LocalMemory, AccessKind::Store | AccessKind::NcStore) => {
                Event::LocalStore(LocalStoreStep::Start)
            }
            (ModuleKind::LocalMemory, AccessKind::Flush) => {
                return Err(SimError::UnsupportedAccess {
                    module: target.name().to_string(),
                    kind,
                });
            }
            (_, AccessKind::Load) => Event::Load(LoadStep::Start),
            (_, AccessKind::Store) => Event::Store(StoreStep::Start),
            (_, AccessKind::NcStore) => Event::NcStore(NcStoreStep::Start),
            (_, AccessKind::Prefetch) => Event::Prefetch(PrefetchStep::Start),
            (_, AccessKind::Flush) => Event::Flush(FlushStep::Start),
        };

        let id = self.next_access_id;
        self.next_access_id += 1;
        self.accesses_issued += 1;

        let mut frame = Frame::new(id, module, addr);
        frame.access = Some(kind);
        frame.witness = witness.cloned();
        let handle = self.frames.alloc(frame);
        debug!(
            target: "mem.access",
            access = id,
            module = %self.modules[module.0].name(),
            %kind,
            addr = format_args!("{addr:#x}"),
            "issue"
        );
        self.schedule(event, handle, 0);
        Ok(id)
    }

    /// Issues one flush for every valid block of `module`.
    ///
    /// # Returns
    ///
    /// The ids of the flushes, in set/way order.
    pub fn flush_all(&mut self, module: ModuleId, witness: Option<&Witness>) -> Result<Vec<AccessId>, SimError> {
        let tags: Vec<Address> = self.modules[module.0]
            .cache()
            .valid_blocks()
            .map(|(_, _, block)| block.tag)
            .collect();
        tags.into_iter()
            .map(|tag| self.access(module, AccessKind::Flush, tag, witness))
            .collect()
    }

    /// Runs the earliest pending step.
    ///
    /// # Returns
    ///
    /// `false` when the queue was empty.
    pub fn step(&mut self) -> Result<bool, SimError> {
        let Some(cont) = self.engine.pop() else {
            return Ok(false);
        };
        self.dispatch(cont)?;
        Ok(true)
    }

    /// Runs every step scheduled up to and including `cycle`, then moves time to `cycle`.
    pub fn run_until(&mut self, cycle: u64) -> Result<(), SimError> {
        while self.engine.peek_cycle().is_some_and(|c| c <= cycle) {
            let _ = self.step()?;
        }
        self.engine.advance_to(cycle);
        Ok(())
    }

    /// Runs every step scheduled before `cycle`, then moves time to `cycle`.
    pub fn advance_to(&mut self, cycle: u64) -> Result<(), SimError> {
        if cycle > 0 {
            self.run_until(cycle - 1)?;
        }
        self.engine.advance_to(cycle);
        Ok(())
    }

    /// Cycle of the earliest pending step.
    pub fn next_event_cycle(&self) -> Option<u64> {
        self.engine.peek_cycle()
    }

    /// Runs until the queue is empty.
    ///
    /// # Returns
    ///
    /// The final cycle.
    pub fn run(&mut self) -> Result<u64, SimError> {
        while self.step()? {}
        Ok(self.now())
    }

    /// Takes the ids of the accesses completed since the last call, in completion order.
    pub fn drain_completed(&mut self) -> Vec<AccessId> {
        std::mem::take(&mut self.completed)
    }

    /// State of the block holding `addr` in `module`, `Invalid` when absent.
    pub fn block_state(&self, module: ModuleId, addr: Address) -> BlockState {
        let m = &self.modules[module.0];
        let set = m.set_index(addr);
        let tag = m.block_tag(addr);
        (0..m.cache().num_ways())
            .map(|way| m.cache().block(set, way))
            .find(|block| block.tag == tag && block.state.is_valid())
            .map_or(BlockState::Invalid, |block| block.state)
    }

    fn directory_slot(&self, module: ModuleId, addr: Address) -> Option<(usize, usize, usize)> {
        let m = &self.modules[module.0];
        let set = m.set_index(addr);
        let tag = m.block_tag(addr);
        let way = (0..m.cache().num_ways()).find(|&way| {
            let block = m.cache().block(set, way);
            block.tag == tag && block.state.is_valid()
        })?;
        let sub = ((addr - tag) / m.sub_block_size()) as usize;
        Some((set, way, sub))
    }

    /// Upper modules recorded as sharers of the sub-block holding `addr` in `module`.
    pub fn sharers(&self, module: ModuleId, addr: Address) -> Vec<ModuleId> {
        let Some((set, way, sub)) = self.directory_slot(module, addr) else {
            return Vec::new();
        };
        self.modules[module.0]
            .directory()
            .sharers(set, way, sub)
            .filter_map(|node| self.try_node_module(module, node))
            .collect()
    }

    /// Upper module recorded as owner of the sub-block holding `addr` in `module`.
    pub fn owner(&self, module: ModuleId, addr: Address) -> Option<ModuleId> {
        let (set, way, sub) = self.directory_slot(module, addr)?;
        let node = self.modules[module.0].directory().entry(set, way, sub).owner()?;
        self.try_node_module(module, node)
    }

    /// Snapshot of every counter.
    pub fn stats(&self) -> SimStats {
        SimStats {
            cycles: self.now(),
            accesses_issued: self.accesses_issued,
            accesses_completed: self.accesses_completed,
            modules: self
                .modules
                .iter()
                .map(|m| ModuleReport {
                    name: m.name().to_string(),
                    stats: *m.stats(),
                })
                .collect(),
            networks: self
                .networks
                .iter()
                .map(|net| NetworkReport {
                    name: net.name().to_string(),
                    nodes: (0..net.num_nodes())
                        .map(|node| NodeReport {
                            name: net.node_name(node).unwrap_or_default(),
                            stats: net.node_stats(node),
                        })
                        .collect(),
                })
                .collect(),
        }
    }

    fn dispatch(&mut self, cont: Continuation) -> Result<(), SimError> {
        let (id, module) = {
            let frame = &self.frames[cont.frame];
            (frame.id, frame.module)
        };
        trace!(
            target: "mem.access",
            name = format_args!("A-{id}"),
            state = format_args!("{}:{}", self.modules[module.0].name(), cont.event),
            cycle = self.now(),
        );
        protocol::dispatch(self, cont)
    }

    // Protocol helpers.

    /// Schedules `event` on `frame` after `delay` cycles.
    pub(crate) fn schedule(&mut self, event: Event, frame: FrameId, delay: u64) {
        self.engine.schedule(Continuation::new(event, frame), delay);
    }

    /// Resumes `conts` after `delay` cycles.
    pub(crate) fn wake(&mut self, conts: Vec<Continuation>, delay: u64) {
        for cont in conts {
            self.engine.schedule(cont, delay);
        }
    }

    /// Starts `child` at `event`; `parent` resumes at `return_event` when it returns.
    pub(crate) fn call(&mut self, event: Event, child: Frame, parent: FrameId, return_event: Event) {
        let handle = self.frames.alloc_child(child, parent, return_event);
        self.schedule(event, handle, 0);
    }

    /// Finishes `frame`.
    ///
    /// A child frame is released and its parent resumed; a top-level frame is
    /// released and its access recorded as completed.
    pub(crate) fn ret(&mut self, frame: FrameId) {
        let done = self.frames.release(frame);
        match (done.parent(), done.return_event()) {
            (Some(parent), Some(event)) => self.schedule(event, parent, 0),
            _ => {
                debug!(target: "mem.access", access = done.id, cycle = self.now(), "complete");
                self.completed.push(done.id);
                self.accesses_completed += 1;
            }
        }
    }

    /// Requests a port of `module` for `frame`.
    ///
    /// `resume` runs with the port held: right away when one is free,
    /// otherwise when a holder hands its port over.
    pub(crate) fn lock_port(&mut self, module: ModuleId, frame: FrameId, resume: Event) {
        let direction = self.frames[frame].direction;
        let cont = Continuation::new(resume, frame);
        if let Some(port) = self.modules[module.0].ports.lock_port(cont, direction) {
            self.frames[frame].port = Some(port);
            self.engine.schedule(cont, 0);
        }
    }

    /// Releases the port held by `frame` and hands it to the next waiter.
    pub(crate) fn unlock_port(&mut self, module: ModuleId, frame: FrameId) {
        let Some(port) = self.frames[frame].port.take() else {
            panic!("A-{} releases a port it does not hold", self.frames[frame].id);
        };
        if let Some(next) = self.modules[module.0].ports.unlock_port(port, frame) {
            self.frames[next.frame].port = Some(port);
            self.engine.schedule(next, 0);
        }
    }

    /// Unlocks a directory entry; the waiters retry one cycle later.
    pub(crate) fn unlock_entry(&mut self, module: ModuleId, set: usize, way: usize, id: AccessId) {
        let waiters = self.modules[module.0].directory.unlock_entry(set, way, id);
        self.wake(waiters, 1);
    }

    /// Lower module serving `addr` below `module`.
    pub(crate) fn low_module_serving(&self, module: ModuleId, addr: Address) -> Result<ModuleId, SimError> {
        self.modules[module.0].low_module_serving(&self.modules, addr)
    }

    /// Jittered retry delay of `module`.
    pub(crate) fn retry_latency(&mut self, module: ModuleId) -> u64 {
        self.modules[module.0].retry_latency(&mut self.rng)
    }

    /// Node of `upper` in the high network of the module below it.
    pub(crate) fn sharer_node(&self, upper: ModuleId) -> NodeId {
        match self.modules[upper.0].low_link() {
            Some(link) => link.node,
            None => panic!("module '{}' has no low network", self.modules[upper.0].name()),
        }
    }

    fn try_node_module(&self, lower: ModuleId, node: NodeId) -> Option<ModuleId> {
        let link = self.modules[lower.0].high_link()?;
        self.networks[link.network.0].node_module(node)
    }

    /// Upper module attached to `node` of `lower`'s high network.
    pub(crate) fn node_module(&self, lower: ModuleId, node: NodeId) -> ModuleId {
        match self.try_node_module(lower, node) {
            Some(module) => module,
            None => panic!(
                "module '{}' tracks node {node} that is not attached to it",
                self.modules[lower.0].name()
            ),
        }
    }

    fn route(&self, from: ModuleId, to: ModuleId) -> (usize, NodeId, NodeId) {
        let src = &self.modules[from.0];
        let dst = &self.modules[to.0];
        let links = if src.low_modules().contains(&to) {
            src.low_link().zip(dst.high_link())
        } else {
            src.high_link().zip(dst.low_link())
        };
        match links {
            Some((a, b)) => (a.network.0, a.node, b.node),
            None => panic!("no network between '{}' and '{}'", src.name(), dst.name()),
        }
    }

    /// Sends a `size`-byte message for `frame` from `from` to the adjacent module `to`.
    ///
    /// `arrive` runs when the message reaches `to`; `retry` runs after the
    /// back-off when the network refuses the message.
    pub(crate) fn send(&mut self, frame: FrameId, from: ModuleId, to: ModuleId, size: u64, arrive: Event, retry: Event) {
        let (net, src, dst) = self.route(from, to);
        let now = self.now();
        match self.networks[net].try_send(src, dst, size, now) {
            Ok(message) => {
                self.frames[frame].message = Some(message);
                self.schedule(arrive, frame, message.arrival - now);
            }
            Err(busy) => {
                debug!(
                    target: "mem.net",
                    access = self.frames[frame].id,
                    network = net,
                    retry_after = busy.retry_after,
                    "link busy"
                );
                self.schedule(retry, frame, busy.retry_after);
            }
        }
    }

    /// Consumes the message `frame` sent from `from` to `to`.
    pub(crate) fn receive(&mut self, frame: FrameId, from: ModuleId, to: ModuleId) {
        let (net, _, dst) = self.route(from, to);
        let Some(message) = self.frames[frame].message.take() else {
            panic!("A-{} receives without a message in flight", self.frames[frame].id);
        };
        self.networks[net].receive(dst, &message);
    }

    /// Child frame of `parent` for the same access.
    pub(crate) fn child_frame(&self, parent: FrameId, module: ModuleId, addr: Address) -> Frame {
        Frame::new(self.frames[parent].id, module, addr)
    }

    /// Child frame for a request from `module` to `target`.
    pub(crate) fn request_frame(
        &self,
        parent: FrameId,
        module: ModuleId,
        target: ModuleId,
        addr: Address,
        direction: RequestDirection,
    ) -> Frame {
        let mut frame = self.child_frame(parent, module, addr);
        frame.target = Some(target);
        frame.direction = direction;
        frame
    }
}
