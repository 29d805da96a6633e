//! Application services layer.

pub mod error;
pub mod notify;
pub mod orders;
pub mod repos;
