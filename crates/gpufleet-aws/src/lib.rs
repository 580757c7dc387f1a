//! AWS provider for gpufleet
//!
//! Implements [`gpufleet_cloud::CloudInspector`] on top of the `aws` CLI.
//!
//! # Requirements
//!
//! - AWS CLI v2 installed and on PATH
//! - Credentials resolvable by the CLI (environment, profile or SSO)
//!
//! # Example
//!
//! ```ignore
//! use gpufleet_aws::AwsInspector;
//! use gpufleet_cloud::{CloudInspector, ResourceFilter, ResourceKind};
//!
//! let aws = AwsInspector::new("us-east-1", None);
//! let auth = aws.check_auth().await?;
//! let vpcs = aws
//!     .describe(ResourceKind::Vpc, &ResourceFilter::convention("gpu-dev", None))
//!     .await?;
//! ```

pub mod awscli;
pub mod error;
pub mod inspector;
pub mod types;

pub use awscli::AwsCli;
pub use error::{AwsError, Result};
pub use inspector::AwsInspector;
