//! Many-to-many and one-to-many relations: resolution, membership queries and synchronization.

mod resolver;
pub mod statements;
mod sync;
pub use resolver::*;
pub use sync::*;
