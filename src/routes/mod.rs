//! Route builders.

pub mod common;
pub mod finance;
pub mod tenant;

pub use common::common_routes;
pub use finance::finance_routes;
pub use tenant::tenant_routes;
