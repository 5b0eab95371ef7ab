//! Core types for the award fraud research engine
//!
//! This crate defines the shared error type and the award metadata
//! records consumed by the research and service crates.

pub mod award;
pub mod error;

pub use award::{
    AwardDetails, AwardMetadata, ContractData, ExecutiveDetails, Location, NaicsCode,
    NaicsHierarchy, Officer, Recipient, Transaction,
};
pub use error::{FraudError, FraudResult};
