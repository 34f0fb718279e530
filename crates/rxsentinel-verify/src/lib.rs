//! # rxsentinel-verify
//!
//! Field-rule verification of JSON documents for RxSentinel.
//!
//! This crate provides [`engine::FieldVerifier`], which validates a JSON
//! document against a [`schema::DocumentSchema`] in two phases:
//!
//! 1. **Structural**: JSON Schema validation via the `jsonschema` crate.
//! 2. **Semantic**: field rules (`RequiredField`, `AllowedValues`,
//!    `ForbiddenPattern`, `Custom`), each reported at its own severity.
//!
//! The clinical documentation check runs its rules over the serialized
//! prescription; [`export::verify_case_document`] checks exported case
//! documents before they are stored or inspected.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use rxsentinel_verify::engine::FieldVerifier;
//!
//! let verifier = FieldVerifier::new().with_rule("signed", Box::new(|doc| {
//!     if doc.get("signature_present").and_then(|v| v.as_bool()).unwrap_or(false) {
//!         None
//!     } else {
//!         Some("prescription is not signed".to_string())
//!     }
//! }));
//! let report = verifier.verify(&document, &schema);
//! ```

pub mod engine;
pub mod export;
pub mod schema;

pub use engine::{CustomRuleFn, FieldVerifier};
pub use export::{ensure_valid_case_document, verify_case_document};
pub use schema::{DocumentSchema, FieldRule, FieldRuleKind, VerificationReport, Violation};
