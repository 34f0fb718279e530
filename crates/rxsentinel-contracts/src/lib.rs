//! # rxsentinel-contracts
//!
//! Shared types and error contracts for the RxSentinel verification pipeline.
//!
//! All crates in the workspace import from here. No business logic lives in
//! this crate, only data definitions and error types.

pub mod case;
pub mod check;
pub mod error;
pub mod prescription;
