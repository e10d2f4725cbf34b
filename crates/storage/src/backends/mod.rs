/// In-memory backend.
pub mod memory;
