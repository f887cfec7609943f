//! Convenient imports.
//!
//! ```
//! use syncell::prelude::*;
//!
//! # fn main() -> syncell::Result<()> {
//! let manager = Manager::new(MemoryBackend::new())?;
//! manager.write(Value::Int(1))?;
//! # Ok(())
//! # }
//! ```

pub use crate::backend::Backend;
pub use crate::backends::{FileBackend, MemoryBackend};
pub use crate::error::{Error, Result};
pub use crate::manager::Manager;
pub use crate::retry::{retry, RetryPolicy};
pub use crate::txn::Transaction;
pub use crate::types::{CasOutcome, Version};
pub use crate::value::{Record, Scalar, Value};
pub use crate::wrappers::{BufRef, ListRef, MapRef, RecordRef, SetRef, ValueRef};
