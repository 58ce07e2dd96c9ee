//! Object store boundary and an in-memory implementation.

mod error;
mod event;
mod memory;
mod traits;

pub use error::{Result, StoreError};
pub use event::Event;
pub use memory::MemoryStore;
pub use traits::ObjectStore;
