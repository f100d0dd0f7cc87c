pub mod memory;

pub use memory::{format_bytes, MemoryInfo, GIB};
