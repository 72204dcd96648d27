//! HTTP handlers for tenant selection, onboarding, and tenant-store data.

pub mod finance;
pub mod tenant;
pub use finance::*;
pub use tenant::*;
