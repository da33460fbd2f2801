pub mod memory;
pub mod mime;
pub mod sqlite;
