//! Blob storage backends for template sources, job inputs and artifacts.

mod fs;
mod s3;

pub use fs::FilesystemBlobStore;
pub use s3::{S3BlobStore, S3Options};
