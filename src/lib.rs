//! strkloop-submitter - Starknet invoke transaction submission
//!
//! Builds a single contract call, assembles and signs an INVOKE v1
//! transaction, validates its fee cap against a node estimate (re-signing at
//! most once with a 20% margin), broadcasts it and reports its status.

pub mod account;
pub mod chain;
pub mod config;
pub mod error;
pub mod metrics;
pub mod tx;

pub use account::{Account, CredentialProvider, LocalKeystore};
pub use chain::{ChainClient, ChainProvider};
pub use error::{ChainError, SubmitError, SubmitResult};
pub use tx::{
    CallDescriptor, StatusReport, SubmissionPipeline, SubmissionResult, UnknownStatus,
};
