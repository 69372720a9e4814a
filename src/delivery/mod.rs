pub mod client;
pub mod payload;

pub use client::{DeliveryClient, DeliveryError, FlushOutcome};
pub use payload::{DeliveryBatch, DeliveryMode, InventoryMeta};
