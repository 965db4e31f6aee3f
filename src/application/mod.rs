//! Application services: the pipeline stages, their execution strategies and the ports
//! they drive.

pub mod compile;
pub mod delivery;
pub mod error;
pub mod ingest;
pub mod lease;
pub mod pipeline;
pub mod ports;
pub mod random;
pub mod render;
pub mod repos;
pub mod retry;
