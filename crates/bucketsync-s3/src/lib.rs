//! bucketsync S3 - S3-compatible object store adapter
//!
//! Provides:
//! - [`store::S3ObjectStore`], the `IObjectStore` implementation on top of `aws-sdk-s3`
//! - [`resolver::S3StoreResolver`], which builds one client per configured profile
//!
//! Credentials always come from the standard AWS provider chain; profiles
//! only carry endpoint, region and addressing style, so the same adapter
//! works for AWS, MinIO, R2 and other S3-compatible services.

pub mod resolver;
pub mod store;

use thiserror::Error;

/// Errors raised by the S3 adapter
#[derive(Debug, Error)]
pub enum S3Error {
    /// The profile is neither configured nor the implicit `default`
    #[error("Unknown storage profile: {0}")]
    UnknownProfile(String),

    /// The object does not exist
    #[error("Object not found: s3://{bucket}/{key}")]
    NotFound { bucket: String, key: String },

    /// A request was rejected or could not be sent
    #[error("{operation} s3://{bucket}/{key} failed: {message}")]
    Request {
        operation: &'static str,
        bucket: String,
        key: String,
        message: String,
    },

    /// The response could not be interpreted
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}
