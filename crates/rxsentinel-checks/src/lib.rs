//! # rxsentinel-checks
//!
//! Reference implementations of every collaborator the RxSentinel pipeline
//! needs:
//!
//! - the eight check units ([`units`]), backed by a [`ReferenceLookup`];
//! - mock license, DEA, drug, and state-rule registries ([`mock_data`]);
//! - a document extractor for JSON and labelled-text prescriptions;
//! - in-memory and JSON-file record stores;
//! - [`pipeline::build_service`], which wires them to the policy aggregator;
//! - the built-in demo [`scenarios`].
//!
//! All reference data is hardcoded and fictional. No external registry is
//! contacted.

pub mod extraction;
pub mod lookup;
pub mod mock_data;
pub mod pipeline;
pub mod scenarios;
pub mod store;
pub mod units;

pub use extraction::DocumentExtractor;
pub use lookup::{LookupError, ReferenceLookup};
pub use mock_data::{FlakyLookup, MockReferenceData};
pub use pipeline::{build_orchestrator, build_service};
pub use store::{CaseRecord, InMemoryRecordStore, JsonFileRecordStore};
pub use units::default_units;
