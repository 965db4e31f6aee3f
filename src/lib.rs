//! Recoverable document generation and delivery.
//!
//! Units of work (spreadsheet rows, invoices) are claimed exactly once, rendered into a PDF,
//! stored in blob storage and emailed, either by leased polling workers or by queued
//! workflow instances that replay from a persisted step log.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
pub mod util;
