//! Request extractors for tenant-bound handlers.

pub mod tenant;
pub use tenant::{BoundStore, CurrentTenant};
