//! Data Transfer Objects for REST request/response serialization.
//!
//! Identifiers serialize as plain UUID strings and timestamps as RFC 3339.

pub mod subscription_dto;

pub use subscription_dto::*;
