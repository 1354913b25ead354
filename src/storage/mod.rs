//! Durable recording segment storage
//!
//! Segments are keyed by (session id, sequence number) and must survive an
//! uncontrolled process exit. The store is the single source of truth for
//! recording content; anything held in memory is a cache.

mod file;
mod memory;
mod store;

pub use file::FileSegmentStore;
pub use memory::MemorySegmentStore;
pub use store::{Segment, SegmentStore};
