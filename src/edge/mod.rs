pub mod api;
pub mod server;
pub mod store;
pub mod sweep;

pub use api::EdgeState;
pub use store::{FsRetryStore, QueuedRetry, RetryStore, StoreError};
