//! The reference collaborator the check units consult.
//!
//! License and DEA registries, drug profiles, and per-state dispensing rules
//! all sit behind one `ReferenceLookup` trait. A unit holds an
//! `Arc<dyn ReferenceLookup>` and makes its single external call through it;
//! `LookupError` converts into `CheckError` so units can use `?` and let the
//! orchestrator decide whether to retry.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use rxsentinel_contracts::error::CheckError;

/// A failed lookup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    /// The registry could not be reached. Worth retrying.
    #[error("reference source unavailable: {reason}")]
    Unavailable { reason: String },

    /// The query itself cannot be answered (bad identifier shape).
    #[error("malformed lookup: {reason}")]
    Malformed { reason: String },
}

impl From<LookupError> for CheckError {
    fn from(e: LookupError) -> Self {
        match e {
            LookupError::Unavailable { .. } => CheckError::transient(e.to_string()),
            LookupError::Malformed { .. } => CheckError::terminal(e.to_string()),
        }
    }
}

/// Standing of a state license.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LicenseStatus {
    Active,
    Expired,
    Suspended,
    Revoked,
}

impl LicenseStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            LicenseStatus::Active => "active",
            LicenseStatus::Expired => "expired",
            LicenseStatus::Suspended => "suspended",
            LicenseStatus::Revoked => "revoked",
        }
    }
}

/// A state medical board entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LicenseRecord {
    pub license_number: String,
    pub state: String,
    pub holder_name: String,
    pub npi: Option<String>,
    pub status: LicenseStatus,
    pub expires: NaiveDate,
}

/// DEA controlled substance schedules II through V.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Schedule {
    #[serde(rename = "CII")]
    II,
    #[serde(rename = "CIII")]
    III,
    #[serde(rename = "CIV")]
    IV,
    #[serde(rename = "CV")]
    V,
}

impl Schedule {
    pub fn as_str(self) -> &'static str {
        match self {
            Schedule::II => "CII",
            Schedule::III => "CIII",
            Schedule::IV => "CIV",
            Schedule::V => "CV",
        }
    }

    /// Federal refill ceiling. `None` means no federal limit.
    pub fn max_refills(self) -> Option<u32> {
        match self {
            Schedule::II => Some(0),
            Schedule::III | Schedule::IV => Some(5),
            Schedule::V => None,
        }
    }
}

/// A DEA registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeaRecord {
    pub dea_number: String,
    pub registrant_name: String,
    pub schedules: Vec<Schedule>,
    pub expires: NaiveDate,
}

/// What the checks need to know about a drug.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrugProfile {
    pub name: String,
    pub schedule: Option<Schedule>,
    /// Maximum recommended daily dose for adults, in mg.
    pub max_daily_mg: Option<f64>,
    /// On the list of substances that may not be compounded.
    pub compounding_prohibited: bool,
}

/// Dispensing rules for one state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateRules {
    pub state: String,
    /// Days after writing that a non-controlled prescription may be filled.
    pub prescription_valid_days: u32,
    pub max_refills: u32,
    /// Longest days supply for a single schedule II fill.
    pub schedule_ii_max_days_supply: u32,
    pub requires_patient_address: bool,
}

/// Registry and reference-data queries.
///
/// `Ok(None)` means the source answered and has no record; errors are
/// reserved for the source itself misbehaving.
#[async_trait]
pub trait ReferenceLookup: Send + Sync {
    async fn license(
        &self,
        license_number: &str,
        state: &str,
    ) -> Result<Option<LicenseRecord>, LookupError>;

    async fn dea_registration(&self, dea_number: &str) -> Result<Option<DeaRecord>, LookupError>;

    async fn drug_profile(&self, name: &str) -> Result<Option<DrugProfile>, LookupError>;

    async fn state_rules(&self, state: &str) -> Result<Option<StateRules>, LookupError>;
}
