//! Safe SQL builder: identifiers from validated config only, values as parameters.

mod builder;
pub mod exec;
mod list;
pub mod params;
mod row;
pub use builder::*;
pub use list::*;
pub use params::*;
pub use row::*;
