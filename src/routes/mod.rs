//! Router construction.

mod common;
mod entity;

pub use common::common_routes;
pub use entity::{crud_routes, crud_routes_with_limit};
