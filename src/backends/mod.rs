//! Bundled backend implementations.
//!
//! [`MemoryBackend`] shares a cell between participants in one process;
//! [`FileBackend`] shares a cell between processes through a file with
//! an advisory lock. Both uphold the atomicity contract documented on
//! [`Backend`](crate::backend::Backend).

mod file;
mod memory;

pub use file::FileBackend;
pub use memory::MemoryBackend;
