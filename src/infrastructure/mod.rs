pub mod adapter;
pub mod in_memory;
pub mod restore;
