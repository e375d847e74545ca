//! Route handlers for the HTTP API.

pub mod download;
pub mod jobs;
pub mod system;
