use smalls_gc::RootProvider;
use smalls_heap::HeapPtr;

const DEFAULT_CAPACITY: usize = 64 * 1024;
const HEAP_PTR_SIZE: usize = std::mem::size_of::<u32>();

fn align_up(offset: usize, alignment: usize) -> usize {
    (offset + alignment - 1) & !(alignment - 1)
}

/// Growable bump allocator backing global/module-level constant storage.
/// Every `HeapPtr`-shaped slot written into it must be registered with
/// [`Self::track_heap_ref`] so the collector can find it as a root via
/// [`RootProvider::enumerate_roots`] without scanning the whole arena.
pub struct ConfigArena {
    data: Vec<u8>,
    size: usize,
    heap_ref_offsets: Vec<u32>,
}

impl ConfigArena {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(initial_capacity: usize) -> Self {
        Self {
            data: vec![0u8; initial_capacity],
            size: 0,
            heap_ref_offsets: Vec::new(),
        }
    }

    /// Bumps the arena by `size` bytes at `alignment`, growing (and
    /// zero-filling the new tail) if needed, and returns the slot's offset.
    pub fn allocate(&mut self, size: usize, alignment: usize) -> usize {
        let offset = align_up(self.size, alignment.max(1));
        let end = offset + size;
        if end > self.data.len() {
            let mut new_capacity = self.data.len().max(1) * 2;
            while end > new_capacity {
                new_capacity *= 2;
            }
            self.data.resize(new_capacity, 0);
        }
        self.size = end;
        offset
    }

    /// Marks `offset` as holding a `HeapPtr` the collector must visit.
    pub fn track_heap_ref(&mut self, offset: usize) {
        self.heap_ref_offsets.push(offset as u32);
    }

    /// Allocates a slot already registered as a heap-ref root.
    pub fn allocate_heap_ref(&mut self) -> usize {
        let offset = self.allocate(HEAP_PTR_SIZE, HEAP_PTR_SIZE);
        self.track_heap_ref(offset);
        offset
    }

    pub fn write_heap_ptr(&mut self, offset: usize, ptr: HeapPtr) {
        self.data[offset..offset + HEAP_PTR_SIZE].copy_from_slice(&ptr.0.to_ne_bytes());
    }

    pub fn read_heap_ptr(&self, offset: usize) -> HeapPtr {
        let mut bytes = [0u8; HEAP_PTR_SIZE];
        bytes.copy_from_slice(&self.data[offset..offset + HEAP_PTR_SIZE]);
        HeapPtr(u32::from_ne_bytes(bytes))
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn clear(&mut self) {
        self.size = 0;
        self.heap_ref_offsets.clear();
        self.data.iter_mut().for_each(|b| *b = 0);
    }
}

impl Default for ConfigArena {
    fn default() -> Self {
        Self::new()
    }
}

impl RootProvider for ConfigArena {
    fn enumerate_roots(&self, roots: &mut Vec<HeapPtr>) {
        for &offset in &self.heap_ref_offsets {
            let offset = offset as usize;
            if offset + HEAP_PTR_SIZE <= self.size {
                let ptr = self.read_heap_ptr(offset);
                if !ptr.is_null() {
                    roots.push(ptr);
                }
            }
        }
    }
}
