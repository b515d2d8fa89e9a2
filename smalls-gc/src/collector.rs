use std::collections::HashSet;
use std::time::{Duration, Instant};

use smalls_heap::{Generation, HeapPtr, MarkColor, ManagedHeap};
use smalls_types::TypeId;

use crate::card_table::CardTable;
use crate::config::GCConfig;
use crate::stats::{GCPhase, GCStats, MinorPhase};

/// Discovers every heap pointer directly reachable from an object, and
/// destructs non-inline container state before the heap frees it. This is
/// the "type registry's value-scanner" the collector dispatches through;
/// the collector knows nothing about type shapes beyond the `TypeId` tag
/// on each header.
pub trait HeapTracer {
    fn trace_refs(&self, heap: &ManagedHeap, ptr: HeapPtr, type_id: TypeId) -> Vec<HeapPtr>;
    fn destroy(&self, heap: &mut ManagedHeap, ptr: HeapPtr, type_id: TypeId);
}

/// Supplies the collector with every currently-live root: interpreter
/// frames, open upvalues, module globals, config-arena slots, and the
/// embedder's handle table. Implemented outside this crate by whatever
/// owns those structures.
pub trait RootProvider {
    fn enumerate_roots(&self, roots: &mut Vec<HeapPtr>);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepResult {
    Complete,
    Pending,
}

/// Tri-color incremental mark, generational promotion, card table and
/// remembered set over a [`ManagedHeap`]. A step consults an optional
/// deadline and an optional work budget; if either is exceeded it
/// checkpoints its cursor in `self` and returns [`StepResult::Pending`] --
/// no state lives on the call stack, so resumption is always safe.
pub struct GarbageCollector {
    config: GCConfig,
    phase: GCPhase,
    minor_phase: MinorPhase,
    card_table: CardTable,
    remembered_set: HashSet<HeapPtr>,
    remembered_vec: Vec<HeapPtr>,
    remembered_scan_cursor: usize,
    gray_stack: Vec<HeapPtr>,
    old_bytes: u64,
    stats: GCStats,
    young_sweep_prev: HeapPtr,
    young_sweep_current: HeapPtr,
    major_sweep_prev: HeapPtr,
    major_sweep_current: HeapPtr,
    major_young_head: HeapPtr,
    major_young_tail: HeapPtr,
    major_active: bool,
}

impl GarbageCollector {
    pub fn new(config: GCConfig, heap_capacity: u64) -> Self {
        Self {
            config,
            phase: GCPhase::Idle,
            minor_phase: MinorPhase::MarkRoots,
            card_table: CardTable::new(heap_capacity),
            remembered_set: HashSet::new(),
            remembered_vec: Vec::new(),
            remembered_scan_cursor: 0,
            gray_stack: Vec::new(),
            old_bytes: 0,
            stats: GCStats::default(),
            young_sweep_prev: HeapPtr::NULL,
            young_sweep_current: HeapPtr::NULL,
            major_sweep_prev: HeapPtr::NULL,
            major_sweep_current: HeapPtr::NULL,
            major_young_head: HeapPtr::NULL,
            major_young_tail: HeapPtr::NULL,
            major_active: false,
        }
    }

    pub fn stats(&self) -> GCStats {
        self.stats
    }

    pub fn phase(&self) -> GCPhase {
        self.phase
    }

    fn is_young(&self, heap: &ManagedHeap, ptr: HeapPtr) -> bool {
        heap.get_header(ptr)
            .map(|h| h.generation == Generation::Young)
            .unwrap_or(false)
    }

    fn is_white(&self, heap: &ManagedHeap, ptr: HeapPtr) -> bool {
        heap.get_header(ptr)
            .map(|h| h.mark == MarkColor::White)
            .unwrap_or(false)
    }

    fn shade_gray(&mut self, heap: &mut ManagedHeap, ptr: HeapPtr) {
        if let Some(header) = heap.get_header_mut(ptr) {
            if header.mark == MarkColor::White {
                header.mark = MarkColor::Gray;
                self.gray_stack.push(ptr);
            }
        }
    }

    /// Store barrier: writing a white value into a black object would
    /// violate the no-black-to-white invariant while marking is active, so
    /// shade the new value gray instead.
    pub fn write_barrier_marking(&mut self, heap: &mut ManagedHeap, target: HeapPtr, new_value: HeapPtr) {
        if self.phase == GCPhase::Idle || new_value.is_null() {
            return;
        }
        let target_black = heap
            .get_header(target)
            .map(|h| h.mark == MarkColor::Black)
            .unwrap_or(false);
        if target_black && self.is_white(heap, new_value) {
            self.shade_gray(heap, new_value);
        }
    }

    /// Root-slot barrier: a write into a non-heap root (module global,
    /// config-arena slot) during an active mark phase must also shade its
    /// new value gray, since roots aren't reached through `trace_object`.
    pub fn write_barrier_root(&mut self, heap: &mut ManagedHeap, new_value: HeapPtr) {
        if self.phase == GCPhase::Idle || new_value.is_null() {
            return;
        }
        if self.is_white(heap, new_value) {
            self.shade_gray(heap, new_value);
        }
    }

    /// Records that an old-generation object now refers to a young one
    /// (or was just promoted): dedups into the remembered set, appends to
    /// the ordered remembered vector for scanning, and dirties its card.
    pub fn remembered_set_enqueue(&mut self, heap: &ManagedHeap, old_object: HeapPtr) {
        if self.remembered_set.insert(old_object) {
            self.remembered_vec.push(old_object);
        }
        self.card_table.mark_dirty(old_object.0);
        let _ = heap;
    }

    pub fn card_table(&self) -> &CardTable {
        &self.card_table
    }

    /// Called on every allocation; may start a major cycle if old bytes
    /// exceed the configured threshold of committed bytes. The caller is
    /// expected to then drive the cycle with `collect_major_step`.
    pub fn on_allocation(&mut self, heap: &ManagedHeap, size: u32) {
        let _ = size;
        if !self.major_active
            && self.old_bytes as f64
                > self.config.major_threshold_percent as f64 * heap.committed_bytes() as f64
        {
            self.start_major();
        }
    }

    fn start_major(&mut self) {
        log::debug!("starting major cycle: old_bytes={}", self.old_bytes);
        self.major_active = true;
        self.phase = GCPhase::MarkRoots;
        self.major_sweep_prev = HeapPtr::NULL;
        self.major_sweep_current = HeapPtr::NULL;
    }

    /// Runs a minor cycle to completion with no deadline and the
    /// configured default work budget per step -- for tests and for
    /// callers that don't need cooperative scheduling.
    pub fn collect_minor(
        &mut self,
        heap: &mut ManagedHeap,
        tracer: &dyn HeapTracer,
        roots: &dyn RootProvider,
    ) {
        let budget = self.config.incremental_work_budget;
        while self.collect_minor_step(heap, tracer, roots, budget, None) == StepResult::Pending {}
    }

    /// One bounded slice of a minor cycle. Consumes up to `work_budget`
    /// units of work, stopping early if `deadline` passes. Safe to call
    /// repeatedly; all progress is checkpointed in `self`.
    pub fn collect_minor_step(
        &mut self,
        heap: &mut ManagedHeap,
        tracer: &dyn HeapTracer,
        roots: &dyn RootProvider,
        work_budget: u32,
        deadline: Option<Instant>,
    ) -> StepResult {
        let mut work_done = 0u32;

        loop {
            if work_done >= work_budget {
                return StepResult::Pending;
            }
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    return StepResult::Pending;
                }
            }

            let step_start = Instant::now();
            let active_phase = self.minor_phase;

            match self.minor_phase {
                MinorPhase::MarkRoots => {
                    let mut root_ptrs = Vec::new();
                    roots.enumerate_roots(&mut root_ptrs);
                    for root in root_ptrs {
                        if self.is_young(heap, root) && self.is_white(heap, root) {
                            self.shade_gray(heap, root);
                        }
                    }
                    self.minor_phase = MinorPhase::ScanRemembered;
                    self.remembered_scan_cursor = 0;
                    work_done += 1;
                }
                MinorPhase::ScanRemembered => {
                    if self.remembered_scan_cursor >= self.remembered_vec.len() {
                        self.minor_phase = MinorPhase::TraceGray;
                        continue;
                    }
                    let old_object = self.remembered_vec[self.remembered_scan_cursor];
                    self.remembered_scan_cursor += 1;
                    if let Some(header) = heap.get_header(old_object) {
                        let type_id = header.type_id;
                        let refs = tracer.trace_refs(heap, old_object, type_id);
                        let mut still_points_young = false;
                        for referenced in refs {
                            if self.is_young(heap, referenced) {
                                still_points_young = true;
                                if self.is_white(heap, referenced) {
                                    self.shade_gray(heap, referenced);
                                }
                            }
                        }
                        if !still_points_young {
                            self.remembered_set.remove(&old_object);
                        }
                    }
                    work_done += 1;
                }
                MinorPhase::TraceGray => {
                    let Some(ptr) = self.gray_stack.pop() else {
                        self.minor_phase = MinorPhase::SweepPromote;
                        self.young_sweep_current = heap.young_objects_head();
                        self.young_sweep_prev = HeapPtr::NULL;
                        continue;
                    };
                    if let Some(header) = heap.get_header(ptr) {
                        let type_id = header.type_id;
                        let refs = tracer.trace_refs(heap, ptr, type_id);
                        for referenced in refs {
                            if self.is_young(heap, referenced) && self.is_white(heap, referenced) {
                                self.shade_gray(heap, referenced);
                            }
                        }
                    }
                    if let Some(header) = heap.get_header_mut(ptr) {
                        header.mark = MarkColor::Black;
                    }
                    work_done += 1;
                }
                MinorPhase::SweepPromote => {
                    if self.young_sweep_current.is_null() {
                        self.minor_phase = MinorPhase::MarkRoots;
                        self.phase = GCPhase::Idle;
                        self.stats.minor_cycles += 1;
                        log::trace!(
                            "minor cycle {} complete: {} bytes freed so far",
                            self.stats.minor_cycles,
                            self.stats.bytes_freed
                        );
                        return StepResult::Complete;
                    }
                    let current = self.young_sweep_current;
                    let (next, mark, type_id, alloc_size, age) = {
                        let header = heap.get_header(current).expect("sweep cursor valid");
                        (header.next_young, header.mark, header.type_id, header.alloc_size, header.age)
                    };

                    if mark == MarkColor::White {
                        self.unlink_young(heap, current);
                        tracer.destroy(heap, current, type_id);
                        let _ = heap.free(current);
                        self.stats.record_freed(alloc_size as u64);
                        self.young_sweep_current = next;
                    } else {
                        let new_age = age + 1;
                        if new_age >= self.config.promotion_threshold {
                            self.promote(heap, tracer, current);
                            self.young_sweep_current = next;
                        } else {
                            if let Some(header) = heap.get_header_mut(current) {
                                header.age = new_age;
                                header.mark = MarkColor::White;
                            }
                            self.young_sweep_prev = current;
                            self.young_sweep_current = next;
                        }
                    }
                    work_done += 1;
                }
            }

            let elapsed = step_start.elapsed();
            self.stats.record_pause(elapsed);
            self.stats.record_minor_phase(active_phase, elapsed);
        }
    }

    fn unlink_young(&mut self, heap: &mut ManagedHeap, target: HeapPtr) {
        let next = heap.get_header(target).map(|h| h.next_young).unwrap_or(HeapPtr::NULL);
        if self.young_sweep_prev.is_null() {
            heap.set_young_objects_head(next);
        } else if let Some(prev_header) = heap.get_header_mut(self.young_sweep_prev) {
            prev_header.next_young = next;
        }
    }

    fn promote(&mut self, heap: &mut ManagedHeap, tracer: &dyn HeapTracer, ptr: HeapPtr) {
        let next_young = heap.get_header(ptr).map(|h| h.next_young).unwrap_or(HeapPtr::NULL);
        if self.young_sweep_prev.is_null() {
            heap.set_young_objects_head(next_young);
        } else if let Some(prev_header) = heap.get_header_mut(self.young_sweep_prev) {
            prev_header.next_young = next_young;
        }

        let (type_id, alloc_size) = {
            let header = heap.get_header_mut(ptr).expect("promoted object has header");
            header.generation = Generation::Old;
            header.mark = MarkColor::White;
            (header.type_id, header.alloc_size)
        };
        self.old_bytes += alloc_size as u64;

        let refers_to_young = tracer
            .trace_refs(heap, ptr, type_id)
            .iter()
            .any(|r| self.is_young(heap, *r));
        if refers_to_young {
            self.remembered_set_enqueue(heap, ptr);
        }
    }

    /// Runs a major cycle to completion -- reclaims the whole heap, not
    /// just the young generation.
    pub fn collect_major(
        &mut self,
        heap: &mut ManagedHeap,
        tracer: &dyn HeapTracer,
        roots: &dyn RootProvider,
    ) {
        if !self.major_active {
            self.start_major();
        }
        let budget = self.config.incremental_work_budget;
        while self.collect_major_step(heap, tracer, roots, budget, None) == StepResult::Pending {}
    }

    pub fn collect_major_step(
        &mut self,
        heap: &mut ManagedHeap,
        tracer: &dyn HeapTracer,
        roots: &dyn RootProvider,
        work_budget: u32,
        deadline: Option<Instant>,
    ) -> StepResult {
        if !self.major_active {
            self.start_major();
        }
        let mut work_done = 0u32;

        loop {
            if work_done >= work_budget {
                return StepResult::Pending;
            }
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    return StepResult::Pending;
                }
            }

            let step_start = Instant::now();
            let active_phase = self.phase;

            match self.phase {
                GCPhase::Idle => {
                    self.phase = GCPhase::MarkRoots;
                }
                GCPhase::MarkRoots => {
                    let mut root_ptrs = Vec::new();
                    roots.enumerate_roots(&mut root_ptrs);
                    for root in root_ptrs {
                        if self.is_white(heap, root) {
                            self.shade_gray(heap, root);
                        }
                    }
                    self.phase = GCPhase::MarkIncremental;
                    work_done += 1;
                }
                GCPhase::MarkIncremental => {
                    let Some(ptr) = self.gray_stack.pop() else {
                        self.phase = GCPhase::Sweep;
                        self.major_sweep_current = heap.all_objects_head();
                        self.major_sweep_prev = HeapPtr::NULL;
                        self.major_young_head = HeapPtr::NULL;
                        self.major_young_tail = HeapPtr::NULL;
                        continue;
                    };
                    if let Some(header) = heap.get_header(ptr) {
                        let type_id = header.type_id;
                        for referenced in tracer.trace_refs(heap, ptr, type_id) {
                            if self.is_white(heap, referenced) {
                                self.shade_gray(heap, referenced);
                            }
                        }
                    }
                    if let Some(header) = heap.get_header_mut(ptr) {
                        header.mark = MarkColor::Black;
                    }
                    work_done += 1;
                }
                GCPhase::Sweep => {
                    if self.major_sweep_current.is_null() {
                        self.finish_major_young_list(heap);
                        self.phase = GCPhase::Idle;
                        self.major_active = false;
                        self.stats.major_cycles += 1;
                        self.card_table.clear();
                        log::debug!(
                            "major cycle {} complete: {} objects freed, {} bytes freed",
                            self.stats.major_cycles,
                            self.stats.objects_freed,
                            self.stats.bytes_freed
                        );
                        return StepResult::Complete;
                    }
                    let current = self.major_sweep_current;
                    let (next, mark, type_id, alloc_size, generation) = {
                        let header = heap.get_header(current).expect("sweep cursor valid");
                        (header.next_object, header.mark, header.type_id, header.alloc_size, header.generation)
                    };

                    if mark == MarkColor::White {
                        self.unlink_all_objects(heap, current, next);
                        tracer.destroy(heap, current, type_id);
                        let _ = heap.free(current);
                        self.stats.record_freed(alloc_size as u64);
                        if generation == Generation::Old {
                            self.old_bytes = self.old_bytes.saturating_sub(alloc_size as u64);
                        }
                    } else {
                        if let Some(header) = heap.get_header_mut(current) {
                            header.mark = MarkColor::White;
                        }
                        self.major_sweep_prev = current;
                        if generation == Generation::Young {
                            self.append_major_young_survivor(heap, current);
                        }
                    }
                    self.major_sweep_current = next;
                    work_done += 1;
                }
            }

            let elapsed = step_start.elapsed();
            self.stats.record_pause(elapsed);
            self.stats.record_major_phase(active_phase, elapsed);
        }
    }

    fn unlink_all_objects(&mut self, heap: &mut ManagedHeap, target: HeapPtr, next: HeapPtr) {
        let _ = target;
        if self.major_sweep_prev.is_null() {
            heap.set_all_objects_head(next);
        } else if let Some(prev_header) = heap.get_header_mut(self.major_sweep_prev) {
            prev_header.next_object = next;
        }
    }

    /// Major sweep rebuilds the young-objects list from scratch, since the
    /// all-objects walk is the only traversal over the whole heap -- a
    /// surviving young object is appended to the chain being built here as
    /// it's visited.
    fn append_major_young_survivor(&mut self, heap: &mut ManagedHeap, ptr: HeapPtr) {
        if self.major_young_tail.is_null() {
            self.major_young_head = ptr;
        } else if let Some(tail_header) = heap.get_header_mut(self.major_young_tail) {
            tail_header.next_young = ptr;
        }
        self.major_young_tail = ptr;
    }

    fn finish_major_young_list(&mut self, heap: &mut ManagedHeap) {
        if !self.major_young_tail.is_null() {
            if let Some(tail_header) = heap.get_header_mut(self.major_young_tail) {
                tail_header.next_young = HeapPtr::NULL;
            }
        }
        heap.set_young_objects_head(self.major_young_head);
        self.major_young_head = HeapPtr::NULL;
        self.major_young_tail = HeapPtr::NULL;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smalls_heap::ManagedHeap;

    struct NoRefTracer;
    impl HeapTracer for NoRefTracer {
        fn trace_refs(&self, _heap: &ManagedHeap, _ptr: HeapPtr, _type_id: TypeId) -> Vec<HeapPtr> {
            Vec::new()
        }
        fn destroy(&self, _heap: &mut ManagedHeap, _ptr: HeapPtr, _type_id: TypeId) {}
    }

    struct NoRoots;
    impl RootProvider for NoRoots {
        fn enumerate_roots(&self, _roots: &mut Vec<HeapPtr>) {}
    }

    #[test]
    fn unrooted_object_is_collected_by_minor_cycle() {
        let mut heap = ManagedHeap::with_capacity(1024 * 1024).unwrap();
        let mut gc = GarbageCollector::new(GCConfig::default(), 1024 * 1024);
        let tracer = NoRefTracer;
        let roots = NoRoots;

        let _ptr = heap.allocate(16, 8, TypeId::INT).unwrap();
        gc.collect_minor(&mut heap, &tracer, &roots);

        assert_eq!(gc.stats().objects_freed, 1);
    }

    #[test]
    fn rooted_object_survives_and_eventually_promotes() {
        let mut heap = ManagedHeap::with_capacity(1024 * 1024).unwrap();
        let mut gc = GarbageCollector::new(GCConfig::default(), 1024 * 1024);
        let tracer = NoRefTracer;

        let ptr = heap.allocate(16, 8, TypeId::INT).unwrap();
        struct OneRoot(HeapPtr);
        impl RootProvider for OneRoot {
            fn enumerate_roots(&self, roots: &mut Vec<HeapPtr>) {
                roots.push(self.0);
            }
        }
        let roots = OneRoot(ptr);

        gc.collect_minor(&mut heap, &tracer, &roots);
        gc.collect_minor(&mut heap, &tracer, &roots);
        assert_eq!(gc.stats().objects_freed, 0);

        let header = heap.get_header(ptr).unwrap();
        assert_eq!(header.generation, Generation::Old);
    }

    #[test]
    fn major_sweep_rebuilds_young_list_from_survivors() {
        let mut heap = ManagedHeap::with_capacity(1024 * 1024).unwrap();
        let mut gc = GarbageCollector::new(GCConfig::default(), 1024 * 1024);
        let tracer = NoRefTracer;

        let survivor = heap.allocate(16, 8, TypeId::INT).unwrap();
        let garbage = heap.allocate(16, 8, TypeId::INT).unwrap();
        let _ = garbage;

        struct OneRoot(HeapPtr);
        impl RootProvider for OneRoot {
            fn enumerate_roots(&self, roots: &mut Vec<HeapPtr>) {
                roots.push(self.0);
            }
        }
        let roots = OneRoot(survivor);

        gc.collect_major(&mut heap, &tracer, &roots);

        assert_eq!(gc.stats().objects_freed, 1);
        assert_eq!(heap.young_objects_head(), survivor);
        let header = heap.get_header(survivor).unwrap();
        assert_eq!(header.next_young, HeapPtr::NULL);
        assert_eq!(header.generation, Generation::Young);
    }

    #[test]
    fn gc_step_records_pause_and_phase_timing() {
        let mut heap = ManagedHeap::with_capacity(1024 * 1024).unwrap();
        let mut gc = GarbageCollector::new(GCConfig::default(), 1024 * 1024);
        let tracer = NoRefTracer;
        let roots = NoRoots;

        let _ptr = heap.allocate(16, 8, TypeId::INT).unwrap();
        gc.collect_minor(&mut heap, &tracer, &roots);

        let stats = gc.stats();
        assert_eq!(stats.minor_cycles, 1);
        assert!(stats.max_pause >= stats.cumulative_pause / (stats.minor_cycles.max(1) as u32 * 4));
        assert!(stats.cumulative_pause <= Duration::from_secs(1));
    }

    #[test]
    fn incremental_step_checkpoints_and_completes() {
        let mut heap = ManagedHeap::with_capacity(1024 * 1024).unwrap();
        let mut gc = GarbageCollector::new(GCConfig::default(), 1024 * 1024);
        let tracer = NoRefTracer;
        let roots = NoRoots;

        let _ptr = heap.allocate(16, 8, TypeId::INT).unwrap();
        let mut result = gc.collect_minor_step(&mut heap, &tracer, &roots, 1, None);
        let mut steps = 0;
        while result == StepResult::Pending {
            result = gc.collect_minor_step(&mut heap, &tracer, &roots, 1, None);
            steps += 1;
            assert!(steps < 10_000, "should terminate well within a bounded number of steps");
        }
        assert_eq!(result, StepResult::Complete);
    }
}
