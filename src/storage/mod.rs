pub mod block_store;
pub mod format;
pub mod free_space;
pub mod header;
pub mod io;
pub mod lock;
pub mod write_buffer;
