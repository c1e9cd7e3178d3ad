//! # Route Modules
//!
//! Each module defines an Axum router for one API surface area. Handlers
//! parse the request, call one engine operation, and render the result;
//! no business logic lives here.

pub mod approvals;
pub mod compliances;
pub mod identifiers;
pub mod notifications;
pub mod people;
