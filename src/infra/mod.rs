//! Infrastructure adapters and runtime bootstrap.

pub mod blob;
pub mod compiler;
pub mod csv_source;
pub mod db;
pub mod error;
pub mod mail;
pub mod pdf;
pub mod sheets;
pub mod telemetry;
