//! CrudService: list, read, write and relation sync for registered models.

mod crud;
mod validation;
pub use crud::{BulkAction, BulkRequest, CrudService, ListResponse};
pub use validation::RequestValidator;
