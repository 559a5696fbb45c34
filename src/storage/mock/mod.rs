//! In-memory storage backends.
//!
//! Used by tests and for local development (`Backend=memory` connection
//! strings). They follow the same constraints as the remote services:
//! missing tables/containers are errors, batches are atomic and bounded.

mod object;
mod table;


pub use object::MemoryObjectBackend;
pub use table::MemoryTableBackend;
