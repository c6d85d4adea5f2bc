//! Process queue - owns processes and drives them through each frame
//!
//! The queue keeps two collections. `processes` is ticked every phase;
//! `pending` collects processes attached since the last update. Pending
//! processes are promoted at the start of the next [`update_processes`]
//! call, so the active collection is never mutated while it is being walked.
//!
//! Within a phase, processes are visited in ascending sorting-layer order and
//! in attach order within a layer. Terminal processes have their completion
//! hook dispatched once and are then erased.
//!
//! [`update_processes`]: ProcessQueue::update_processes

use std::time::Instant;

use crate::config::QueueConfig;
use crate::error::{ProcessError, Result};
use crate::layer::{LayerKey, SortingLayerId, SortingLayers};
use crate::process::{
    Lifecycle, LifecycleHook, Outcome, Process, ProcessContext, ProcessHandle, ProcessId,
    ProcessState,
};
use crate::threaded::WorkerHandle;

/// Frame phase being driven
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Update,
    FixedUpdate,
    LateUpdate,
    PostUpdate,
}

/// A process plus the bookkeeping the queue keeps for it
struct ProcessSlot {
    id: ProcessId,
    lifecycle: Lifecycle,
    layer: SortingLayerId,
    process: Box<dyn Process>,
    /// Attached to the queue once this process finishes successfully
    child: Option<Box<ProcessSlot>>,
}

impl ProcessSlot {
    fn new(process: Box<dyn Process>, layer: SortingLayerId) -> Self {
        Self {
            id: ProcessId::new(),
            lifecycle: Lifecycle::new(process.is_threaded()),
            layer,
            process,
            child: None,
        }
    }

    fn find(&self, id: ProcessId) -> Option<&ProcessSlot> {
        if self.id == id {
            return Some(self);
        }
        self.child.as_deref().and_then(|child| child.find(id))
    }

    fn find_mut(&mut self, id: ProcessId) -> Option<&mut ProcessSlot> {
        if self.id == id {
            return Some(self);
        }
        self.child.as_deref_mut().and_then(|child| child.find_mut(id))
    }

    /// Append to the end of the child chain
    fn push_child(&mut self, child: ProcessSlot) {
        match self.child {
            Some(ref mut next) => next.push_child(child),
            None => self.child = Some(Box::new(child)),
        }
    }

    /// Move to `Running` and dispatch `on_init`
    fn initialize(&mut self, delta_ms: u64, config: &QueueConfig) {
        if self.lifecycle.state() != ProcessState::NotStarted
            || !self.lifecycle.claim(LifecycleHook::Init)
        {
            return;
        }
        if let Err(e) = self.lifecycle.transition(ProcessState::Running) {
            log::warn!("{} ({}): {}", self.process.name(), self.id, e);
            return;
        }

        let mut ctx = ProcessContext::new(self.id, delta_ms, config);
        self.process.on_init(&mut ctx);
        self.apply(ctx.outcome());
    }

    /// Dispatch the hook for `phase` if the process is running
    fn tick(&mut self, phase: Phase, delta_ms: u64, config: &QueueConfig) {
        if self.lifecycle.state() != ProcessState::Running {
            return;
        }

        let mut ctx = ProcessContext::new(self.id, delta_ms, config);
        match phase {
            Phase::Update => self.process.on_update(&mut ctx),
            Phase::FixedUpdate => self.process.on_fixed_update(&mut ctx),
            Phase::LateUpdate => self.process.on_late_update(&mut ctx),
            Phase::PostUpdate => self.process.on_post_update(&mut ctx),
        }
        self.apply(ctx.outcome());
    }

    fn apply(&mut self, outcome: Option<Outcome>) {
        let next = match outcome {
            Some(Outcome::Succeed) => ProcessState::Finished,
            Some(Outcome::Fail) => ProcessState::Failed,
            None => return,
        };
        if let Err(e) = self.lifecycle.transition(next) {
            log::warn!("{} ({}): {}", self.process.name(), self.id, e);
        }
    }

    /// Dispatch the completion hook matching the terminal state, once
    fn dispatch_terminal_hook(&mut self) {
        let hook = match self.lifecycle.terminal_hook() {
            Some(hook) => hook,
            None => return,
        };
        if !self.lifecycle.claim(hook) {
            return;
        }

        match hook {
            LifecycleHook::Success => self.process.on_success(),
            LifecycleHook::Fail => self.process.on_fail(),
            LifecycleHook::Abort => self.process.on_abort(),
            LifecycleHook::Init => {}
        }
    }

    fn mark_aborted(&mut self) -> bool {
        if !self.lifecycle.is_alive() {
            log::debug!(
                "Ignoring abort of {} ({}): already {:?}",
                self.process.name(),
                self.id,
                self.lifecycle.state()
            );
            return false;
        }
        match self.lifecycle.transition(ProcessState::Aborted) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("{} ({}): {}", self.process.name(), self.id, e);
                false
            }
        }
    }
}

/// Find the link in a child chain that holds process `id`
fn child_link(
    link: &mut Option<Box<ProcessSlot>>,
    id: ProcessId,
) -> Option<&mut Option<Box<ProcessSlot>>> {
    let found = matches!(link, Some(slot) if slot.id == id);
    if found {
        return Some(link);
    }
    match link {
        Some(slot) => child_link(&mut slot.child, id),
        None => None,
    }
}

/// Move every process on `from` (children included) to the default layer
fn reassign_layer(slots: &mut [ProcessSlot], from: SortingLayerId) -> usize {
    let mut moved = 0;
    for slot in slots.iter_mut() {
        let mut current = Some(slot);
        while let Some(slot) = current {
            if slot.layer == from {
                slot.layer = SortingLayerId::DEFAULT;
                moved += 1;
            }
            current = slot.child.as_deref_mut();
        }
    }
    moved
}

/// Owns all processes of one main loop
pub struct ProcessQueue {
    config: QueueConfig,
    layers: SortingLayers,
    /// Ticked every phase, sorted by layer order
    processes: Vec<ProcessSlot>,
    /// Attached since the last update, promoted at the next one
    pending: Vec<ProcessSlot>,
    /// Workers of retired processes that have not exited yet
    reaping: Vec<WorkerHandle>,
    delta_ms: u64,
}

impl ProcessQueue {
    /// Create a queue with the default configuration
    pub fn new() -> Self {
        Self::with_config(QueueConfig::default())
    }

    /// Create a queue with the given configuration
    pub fn with_config(config: QueueConfig) -> Self {
        Self {
            config,
            layers: SortingLayers::new(),
            processes: Vec::new(),
            pending: Vec::new(),
            reaping: Vec::new(),
            delta_ms: 0,
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    // ========== Attach ==========

    /// Attach a process on the default sorting layer
    ///
    /// With `initialize` set, `on_init` runs now; otherwise it runs when the
    /// process is promoted at the start of the next update.
    pub fn attach_process<P: Process>(&mut self, process: P, initialize: bool) -> ProcessHandle {
        self.attach_boxed(Box::new(process), SortingLayerId::DEFAULT, initialize)
    }

    /// Attach a process on a specific sorting layer
    pub fn attach_process_on_layer<P: Process>(
        &mut self,
        process: P,
        layer: SortingLayerId,
        initialize: bool,
    ) -> ProcessHandle {
        self.attach_boxed(Box::new(process), layer, initialize)
    }

    /// Attach an already boxed process
    ///
    /// Never fails: an unknown layer falls back to the default layer.
    pub fn attach_boxed(
        &mut self,
        process: Box<dyn Process>,
        layer: SortingLayerId,
        initialize: bool,
    ) -> ProcessHandle {
        let layer = self.resolve_layer(layer);
        let mut slot = ProcessSlot::new(process, layer);
        let handle = ProcessHandle::new(slot.id);

        log::debug!(
            "Attached {} ({}) on layer {:?}",
            slot.process.name(),
            slot.id,
            layer
        );

        if initialize {
            slot.initialize(self.delta_ms, &self.config);
        }
        self.pending.push(slot);
        handle
    }

    /// Attach `child` to run once `parent` finishes successfully
    ///
    /// The child joins the end of the parent's child chain and inherits the
    /// parent's sorting layer. If the parent fails or is aborted, the chain is
    /// aborted with it.
    pub fn attach_child<P: Process>(
        &mut self,
        parent: ProcessHandle,
        child: P,
    ) -> Result<ProcessHandle> {
        let slot = self
            .slot_mut(parent.id())
            .ok_or(ProcessError::UnknownProcess(parent.id()))?;

        let child = ProcessSlot::new(Box::new(child), slot.layer);
        let handle = ProcessHandle::new(child.id);
        log::debug!(
            "Chained {} ({}) after {}",
            child.process.name(),
            child.id,
            slot.id
        );
        slot.push_child(child);

        Ok(handle)
    }

    /// Move an active process back into the pending queue
    ///
    /// Threaded processes own a running worker and are rejected.
    pub fn reattach_process(&mut self, handle: ProcessHandle) -> Result<()> {
        let index = self
            .processes
            .iter()
            .position(|slot| slot.id == handle.id())
            .ok_or(ProcessError::UnknownProcess(handle.id()))?;

        if self.processes[index].lifecycle.is_threaded() {
            log::error!("Cannot reattach threaded process {}", handle.id());
            return Err(ProcessError::ThreadedReattach(handle.id()));
        }

        let slot = self.processes.remove(index);
        self.pending.push(slot);
        Ok(())
    }

    fn resolve_layer(&self, layer: SortingLayerId) -> SortingLayerId {
        if self.layers.contains(layer) {
            layer
        } else {
            log::warn!("Unknown sorting layer {:?}, using the default layer", layer);
            SortingLayerId::DEFAULT
        }
    }

    // ========== Sorting layers ==========

    /// Get the sorting layer registry
    pub fn sorting_layers(&self) -> &SortingLayers {
        &self.layers
    }

    /// Add a sorting layer
    pub fn add_sorting_layer(&mut self, name: Option<&str>, order: Option<i32>) -> SortingLayerId {
        let id = self.layers.add_layer(name, order).id;
        self.layers.sort();
        self.refresh_process_order();
        id
    }

    /// Check whether a layer with this name exists
    pub fn has_sorting_layer(&self, name: &str) -> bool {
        self.layers.has_layer(name)
    }

    /// Remove a sorting layer, moving its processes to the default layer
    ///
    /// Returns false for the default layer or an unknown layer.
    pub fn remove_sorting_layer<'a>(&mut self, key: impl Into<LayerKey<'a>>) -> bool {
        let processes = &mut self.processes;
        let pending = &mut self.pending;
        let removed = self.layers.remove_layer(key, |id| {
            let moved = reassign_layer(processes, id) + reassign_layer(pending, id);
            log::debug!("Moved {} processes off sorting layer {:?}", moved, id);
        });

        if removed {
            self.refresh_process_order();
        }
        removed
    }

    /// Change a layer's order and re-sort everything that depends on it
    pub fn set_sorting_layer_order(&mut self, id: SortingLayerId, order: i32) -> Result<()> {
        self.layers.set_layer_order(id, order)?;
        self.layers.sort();
        self.refresh_process_order();
        Ok(())
    }

    /// Load layers saved with [`SortingLayers::to_json`]
    pub fn load_sorting_layers(&mut self, json: &str) -> Result<usize> {
        let added = self.layers.load_json(json)?;
        self.refresh_process_order();
        Ok(added)
    }

    /// Move a process to another sorting layer
    pub fn set_process_sorting_layer(
        &mut self,
        handle: ProcessHandle,
        layer: SortingLayerId,
    ) -> Result<()> {
        if !self.layers.contains(layer) {
            return Err(ProcessError::UnknownSortingLayer(layer));
        }
        let slot = self
            .slot_mut(handle.id())
            .ok_or(ProcessError::UnknownProcess(handle.id()))?;
        slot.layer = layer;
        self.refresh_process_order();
        Ok(())
    }

    /// Reassign every process on `id` to the default layer, then re-sort
    ///
    /// This is the reassignment half of layer removal; it does not touch the
    /// registry.
    pub fn on_remove_sorting_layer(&mut self, id: SortingLayerId) {
        let moved = reassign_layer(&mut self.processes, id) + reassign_layer(&mut self.pending, id);
        log::debug!("Moved {} processes off sorting layer {:?}", moved, id);
        self.refresh_process_order();
    }

    /// Stable sort of both collections by ascending layer order
    pub fn refresh_process_order(&mut self) {
        let layers = &self.layers;
        self.processes.sort_by_key(|slot| layers.order_of(slot.layer));
        self.pending.sort_by_key(|slot| layers.order_of(slot.layer));
    }

    // ========== Frame phases ==========

    /// Promote pending processes, then run `on_update` on every process
    pub fn update_processes(&mut self, delta_ms: u64) {
        self.run_phase(Phase::Update, delta_ms);
    }

    /// Run `on_fixed_update` on every active process
    pub fn fixed_update_processes(&mut self, delta_ms: u64) {
        self.run_phase(Phase::FixedUpdate, delta_ms);
    }

    /// Run `on_late_update` on every active process
    pub fn late_update_processes(&mut self, delta_ms: u64) {
        self.run_phase(Phase::LateUpdate, delta_ms);
    }

    /// Run `on_post_update` on every active process
    pub fn post_update_processes(&mut self, delta_ms: u64) {
        self.run_phase(Phase::PostUpdate, delta_ms);
    }

    fn run_phase(&mut self, phase: Phase, delta_ms: u64) {
        self.delta_ms = delta_ms;
        self.reaping.retain_mut(|worker| !worker.try_reap());

        if phase == Phase::Update {
            self.promote_pending();
        }

        let current = std::mem::take(&mut self.processes);
        let mut survivors = Vec::with_capacity(current.len());
        for mut slot in current {
            slot.tick(phase, delta_ms, &self.config);
            if slot.lifecycle.is_alive() {
                survivors.push(slot);
            } else {
                self.retire(slot);
            }
        }

        // Anything attached during this pass is still in `pending`
        self.processes = survivors;
    }

    fn promote_pending(&mut self) {
        if self.pending.is_empty() {
            return;
        }

        let mut promoted = std::mem::take(&mut self.pending);
        for slot in promoted.iter_mut() {
            slot.initialize(self.delta_ms, &self.config);
        }
        self.processes.append(&mut promoted);

        let layers = &self.layers;
        self.processes.sort_by_key(|slot| layers.order_of(slot.layer));
    }

    /// Dispatch the completion hook and release everything the process holds
    fn retire(&mut self, mut slot: ProcessSlot) {
        slot.dispatch_terminal_hook();

        if let Some(mut worker) = slot.process.take_worker() {
            if !worker.try_reap() {
                log::debug!("Worker '{}' still running, reaping later", worker.name());
                self.reaping.push(worker);
            }
        }

        let state = slot.lifecycle.state();
        log::debug!("Retired {} ({}) as {:?}", slot.process.name(), slot.id, state);

        if let Some(child) = slot.child.take() {
            if state == ProcessState::Finished {
                log::debug!("Attaching child {} of {}", child.id, slot.id);
                self.pending.push(*child);
            } else {
                self.abort_chain(*child);
            }
        }
    }

    fn abort_chain(&mut self, mut slot: ProcessSlot) {
        slot.mark_aborted();
        self.retire(slot);
    }

    // ========== Abort ==========

    /// Abort a process
    ///
    /// A live process moves to `Aborted`. With `immediate`, `on_abort` is
    /// dispatched now and the process is erased; otherwise that happens on
    /// the next phase. Running worker threads are asked to stop, never
    /// killed. Returns false if the process is unknown or already terminal.
    pub fn abort_process(&mut self, handle: ProcessHandle, immediate: bool) -> bool {
        let id = handle.id();

        if let Some(index) = self.processes.iter().position(|slot| slot.id == id) {
            if !self.processes[index].mark_aborted() {
                return false;
            }
            if immediate {
                let slot = self.processes.remove(index);
                self.retire(slot);
            }
            return true;
        }

        if let Some(index) = self.pending.iter().position(|slot| slot.id == id) {
            if !self.pending[index].mark_aborted() {
                return false;
            }
            if immediate {
                let slot = self.pending.remove(index);
                self.retire(slot);
            }
            return true;
        }

        let taken = {
            let link = self
                .processes
                .iter_mut()
                .chain(self.pending.iter_mut())
                .find_map(|slot| child_link(&mut slot.child, id));
            let link = match link {
                Some(link) => link,
                None => {
                    log::debug!("Ignoring abort of unknown process {}", id);
                    return false;
                }
            };
            match link.as_deref_mut() {
                Some(slot) => {
                    if !slot.mark_aborted() {
                        return false;
                    }
                }
                None => return false,
            }
            if !immediate {
                return true;
            }
            link.take()
        };

        if let Some(slot) = taken {
            self.retire(*slot);
        }
        true
    }

    /// Abort every active process
    pub fn abort_all_processes(&mut self, immediate: bool) {
        let ids: Vec<ProcessId> = self.processes.iter().map(|slot| slot.id).collect();
        log::debug!("Aborting {} processes", ids.len());
        for id in ids {
            self.abort_process(ProcessHandle::new(id), immediate);
        }
    }

    /// Abort every active process immediately and empty the active collection
    ///
    /// The pending queue is left untouched.
    pub fn clear_processes(&mut self) {
        self.abort_all_processes(true);
        for slot in std::mem::take(&mut self.processes) {
            self.retire(slot);
        }
    }

    /// Abort everything, pending included, and wait a bounded time for workers
    ///
    /// Workers that have not stopped within the configured reap timeout are
    /// detached. Also runs on drop.
    pub fn shutdown(&mut self) {
        self.clear_processes();
        for mut slot in std::mem::take(&mut self.pending) {
            slot.mark_aborted();
            self.retire(slot);
        }

        let deadline = Instant::now() + self.config.reap_timeout();
        for worker in self.reaping.drain(..) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            worker.reap_within(remaining);
        }
    }

    // ========== Queries ==========

    fn slot(&self, id: ProcessId) -> Option<&ProcessSlot> {
        self.processes
            .iter()
            .chain(self.pending.iter())
            .find_map(|slot| slot.find(id))
    }

    fn slot_mut(&mut self, id: ProcessId) -> Option<&mut ProcessSlot> {
        self.processes
            .iter_mut()
            .chain(self.pending.iter_mut())
            .find_map(|slot| slot.find_mut(id))
    }

    /// State of a process still owned by the queue
    pub fn state(&self, handle: ProcessHandle) -> Option<ProcessState> {
        self.slot(handle.id()).map(|slot| slot.lifecycle.state())
    }

    /// Whether the process is owned by the queue and not terminal
    pub fn is_alive(&self, handle: ProcessHandle) -> bool {
        self.slot(handle.id())
            .map(|slot| slot.lifecycle.is_alive())
            .unwrap_or(false)
    }

    /// Sorting layer of a process
    pub fn sorting_layer_of(&self, handle: ProcessHandle) -> Option<SortingLayerId> {
        self.slot(handle.id()).map(|slot| slot.layer)
    }

    /// Ids of active processes in tick order
    pub fn active_ids(&self) -> Vec<ProcessId> {
        self.processes.iter().map(|slot| slot.id).collect()
    }

    /// Ids of pending processes in promotion order
    pub fn pending_ids(&self) -> Vec<ProcessId> {
        self.pending.iter().map(|slot| slot.id).collect()
    }

    /// Number of active processes
    pub fn process_count(&self) -> usize {
        self.processes.len()
    }

    /// Number of processes waiting for promotion
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Number of threaded processes, active or pending
    pub fn threaded_process_count(&self) -> usize {
        self.processes
            .iter()
            .chain(self.pending.iter())
            .filter(|slot| slot.lifecycle.is_threaded())
            .count()
    }

    /// Number of resource loads, active or pending
    pub fn load_process_count(&self) -> usize {
        self.processes
            .iter()
            .chain(self.pending.iter())
            .filter(|slot| slot.process.is_load_process())
            .count()
    }

    /// Number of retired workers that have not exited yet
    pub fn reaping_count(&self) -> usize {
        self.reaping.len()
    }

    /// Delta passed to the most recent phase
    pub fn last_delta_ms(&self) -> u64 {
        self.delta_ms
    }

    /// Check if nothing is active or pending
    pub fn is_empty(&self) -> bool {
        self.processes.is_empty() && self.pending.is_empty()
    }
}

impl Default for ProcessQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ProcessQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;

    #[derive(Default)]
    struct Counter {
        inits: Arc<Mutex<u32>>,
        updates: Arc<Mutex<u32>>,
    }

    impl Process for Counter {
        fn on_init(&mut self, _ctx: &mut ProcessContext<'_>) {
            *self.inits.lock() += 1;
        }

        fn on_update(&mut self, _ctx: &mut ProcessContext<'_>) {
            *self.updates.lock() += 1;
        }
    }

    struct Idle;

    impl Process for Idle {}

    #[test]
    fn test_attach_goes_to_pending() {
        let mut queue = ProcessQueue::new();
        let handle = queue.attach_process(Idle, false);

        assert_eq!(queue.pending_count(), 1);
        assert_eq!(queue.process_count(), 0);
        assert_eq!(queue.state(handle), Some(ProcessState::NotStarted));

        queue.update_processes(16);
        assert_eq!(queue.pending_count(), 0);
        assert_eq!(queue.process_count(), 1);
        assert_eq!(queue.state(handle), Some(ProcessState::Running));
        assert_eq!(queue.last_delta_ms(), 16);
    }

    #[test]
    fn test_initialize_now_runs_init_once() {
        let counter = Counter::default();
        let inits = Arc::clone(&counter.inits);
        let updates = Arc::clone(&counter.updates);

        let mut queue = ProcessQueue::new();
        let handle = queue.attach_process(counter, true);
        assert_eq!(*inits.lock(), 1);
        assert_eq!(queue.state(handle), Some(ProcessState::Running));

        queue.update_processes(0);
        queue.update_processes(0);
        assert_eq!(*inits.lock(), 1);
        assert_eq!(*updates.lock(), 2);
    }

    #[test]
    fn test_unknown_layer_falls_back_to_default() {
        let mut queue = ProcessQueue::new();
        let handle = queue.attach_process_on_layer(Idle, SortingLayerId::new(77), false);
        assert_eq!(queue.sorting_layer_of(handle), Some(SortingLayerId::DEFAULT));
    }

    #[test]
    fn test_abort_terminal_is_noop() {
        let mut queue = ProcessQueue::new();
        let handle = queue.attach_process(Idle, false);
        queue.update_processes(0);

        assert!(queue.abort_process(handle, false));
        assert_eq!(queue.state(handle), Some(ProcessState::Aborted));
        assert!(!queue.abort_process(handle, true));

        queue.update_processes(0);
        assert_eq!(queue.state(handle), None);
        assert!(!queue.abort_process(handle, true));
    }

    #[test]
    fn test_set_process_sorting_layer_validates() {
        let mut queue = ProcessQueue::new();
        let handle = queue.attach_process(Idle, false);
        let missing = SortingLayerId::new(9);

        assert_eq!(
            queue.set_process_sorting_layer(handle, missing),
            Err(ProcessError::UnknownSortingLayer(missing))
        );

        let hud = queue.add_sorting_layer(Some("hud"), Some(3));
        queue.set_process_sorting_layer(handle, hud).unwrap();
        assert_eq!(queue.sorting_layer_of(handle), Some(hud));
    }
}
