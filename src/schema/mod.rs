//! Schema introspection over configured table definitions.

mod introspect;
pub use introspect::*;
