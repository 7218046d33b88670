//! HTTP handlers for model CRUD and form specs.

pub mod entity;
pub mod formspec;
