use smalls_gc::{GCConfig, GarbageCollector};
use smalls_heap::{HeapError, ManagedHeap, RESERVE_SIZE};
use smalls_resolver::{ConfigArena, Environment};

use crate::native::{NativeModule, NativeModuleRegistry};

/// The mutator-side runtime: a managed heap, its collector, the global
/// environment and config arena, and whatever native modules the embedder
/// installed. One `Runtime` backs one single-mutator program -- the core
/// never shares this across threads.
pub struct Runtime {
    pub heap: ManagedHeap,
    pub collector: GarbageCollector,
    pub globals: Environment,
    pub config_arena: ConfigArena,
    natives: NativeModuleRegistry,
}

impl Runtime {
    pub fn new() -> Result<Self, HeapError> {
        Self::with_capacity(RESERVE_SIZE, GCConfig::default())
    }

    pub fn with_capacity(heap_capacity: u64, gc_config: GCConfig) -> Result<Self, HeapError> {
        let heap = ManagedHeap::with_capacity(heap_capacity)?;
        let collector = GarbageCollector::new(gc_config, heap_capacity);
        Ok(Self {
            heap,
            collector,
            globals: Environment::new(),
            config_arena: ConfigArena::new(),
            natives: NativeModuleRegistry::new(),
        })
    }

    pub fn register_native_module(&mut self, module: NativeModule) {
        self.natives.register(module);
    }

    pub fn get_native_module(&self, name: &str) -> Option<&NativeModule> {
        self.natives.get(name)
    }
}

/// Constructs the managed heap, collector, and global environment a
/// compilation/execution session needs, with default sizing.
pub fn create_runtime() -> Result<Runtime, HeapError> {
    Runtime::new()
}
