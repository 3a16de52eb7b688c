//! Services behind the request handler: persistence and time.

pub mod clock;
pub mod memory_storage;
pub mod storage_service;
