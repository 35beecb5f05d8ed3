//! Adapters implementing the domain ports: storage backends, the in-process message
//! router, and the external-system client.

pub mod external_client;
pub mod in_memory;
pub mod message_bus;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
