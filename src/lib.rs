//! Order lifecycle and view-cache consistency for a food-ordering backend.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
