//! Generational, incremental, tri-color garbage collector over
//! [`smalls_heap::ManagedHeap`].
//!
//! Stays decoupled from the AST and resolver by dispatching type-shape
//! knowledge through the [`HeapTracer`] trait and root enumeration through
//! [`RootProvider`] -- both implemented by the embedder.

mod card_table;
mod collector;
mod config;
mod stats;

pub use card_table::{CardTable, CARD_SIZE};
pub use collector::{GarbageCollector, HeapTracer, RootProvider, StepResult};
pub use config::GCConfig;
pub use stats::{GCPhase, GCStats, MinorPhase};
