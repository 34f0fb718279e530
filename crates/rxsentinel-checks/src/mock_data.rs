//! Simulated reference data for the RxSentinel check units.
//!
//! All data in this module is hardcoded and fictional. No external registry is
//! contacted. `MockReferenceData` stands in for state medical boards, the DEA
//! registration database, a drug compendium, and state pharmacy rules.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::debug;

use crate::lookup::{
    DeaRecord, DrugProfile, LicenseRecord, LicenseStatus, LookupError, ReferenceLookup, Schedule,
    StateRules,
};

/// In-memory registries keyed by normalized identifiers.
///
/// Known prescribers:
/// - Dr. Alicia Rivera (CA `A123456`, DEA `AR1234563`, schedules II-V)
/// - Dr. Benjamin Chen (NY `MD-44821`, DEA `BC2468139`, schedules III-V only)
/// - Dr. Priya Patel (CA `G998877`, license and DEA both expired)
/// - Dr. Marcus Okafor (TX `TX-55120`, license suspended)
pub struct MockReferenceData {
    licenses: HashMap<(String, String), LicenseRecord>,
    registrations: HashMap<String, DeaRecord>,
    drugs: HashMap<String, DrugProfile>,
    states: HashMap<String, StateRules>,
}

impl MockReferenceData {
    pub fn new() -> Self {
        let mut licenses = HashMap::new();
        for record in [
            license("A123456", "CA", "Dr. Alicia Rivera", Some("1234567893"), LicenseStatus::Active, (2027, 6, 30)),
            license("MD-44821", "NY", "Dr. Benjamin Chen", Some("1467583920"), LicenseStatus::Active, (2026, 12, 31)),
            license("G998877", "CA", "Dr. Priya Patel", Some("1588776655"), LicenseStatus::Expired, (2025, 9, 30)),
            license("TX-55120", "TX", "Dr. Marcus Okafor", None, LicenseStatus::Suspended, (2027, 1, 31)),
        ] {
            licenses.insert(
                (normalize(&record.license_number), normalize(&record.state)),
                record,
            );
        }

        let all_schedules = vec![Schedule::II, Schedule::III, Schedule::IV, Schedule::V];
        let mut registrations = HashMap::new();
        for record in [
            dea("AR1234563", "Dr. Alicia Rivera", all_schedules.clone(), (2027, 3, 31)),
            dea("BC2468139", "Dr. Benjamin Chen", vec![Schedule::III, Schedule::IV, Schedule::V], (2026, 11, 30)),
            dea("FP7531242", "Dr. Priya Patel", all_schedules, (2025, 8, 31)),
        ] {
            registrations.insert(normalize(&record.dea_number), record);
        }

        let mut drugs = HashMap::new();
        for profile in [
            drug("lisinopril", None, Some(80.0)),
            drug("metformin", None, Some(2550.0)),
            drug("atorvastatin", None, Some(80.0)),
            drug("amoxicillin", None, Some(3000.0)),
            drug("ibuprofen", None, Some(3200.0)),
            drug("gabapentin", None, Some(3600.0)),
            drug("baclofen", None, Some(80.0)),
            drug("hydrocortisone", None, None),
            drug("ketoprofen", None, None),
            drug("lidocaine", None, None),
            drug("oxycodone", Some(Schedule::II), None),
            drug("hydrocodone", Some(Schedule::II), None),
            drug("methylphenidate", Some(Schedule::II), Some(60.0)),
            drug("testosterone", Some(Schedule::III), None),
            drug("alprazolam", Some(Schedule::IV), Some(4.0)),
            drug("zolpidem", Some(Schedule::IV), Some(10.0)),
            drug("tramadol", Some(Schedule::IV), Some(400.0)),
            drug("pregabalin", Some(Schedule::V), Some(600.0)),
            DrugProfile {
                compounding_prohibited: true,
                ..drug("phenacetin", None, None)
            },
        ] {
            drugs.insert(normalize(&profile.name), profile);
        }

        let mut states = HashMap::new();
        for rules in [
            state("CA", 365, 11, 90, true),
            state("NY", 365, 5, 30, true),
            state("TX", 365, 11, 90, false),
        ] {
            states.insert(normalize(&rules.state), rules);
        }

        Self {
            licenses,
            registrations,
            drugs,
            states,
        }
    }
}

impl Default for MockReferenceData {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReferenceLookup for MockReferenceData {
    async fn license(
        &self,
        license_number: &str,
        state: &str,
    ) -> Result<Option<LicenseRecord>, LookupError> {
        if license_number.trim().contains(char::is_whitespace) {
            return Err(LookupError::Malformed {
                reason: format!("license number '{license_number}' contains whitespace"),
            });
        }
        let key = (normalize(license_number), normalize(state));
        Ok(self.licenses.get(&key).cloned())
    }

    async fn dea_registration(&self, dea_number: &str) -> Result<Option<DeaRecord>, LookupError> {
        Ok(self.registrations.get(&normalize(dea_number)).cloned())
    }

    /// Matches on the generic name; "Lisinopril 10 mg tablet" finds
    /// `lisinopril` by its first word.
    async fn drug_profile(&self, name: &str) -> Result<Option<DrugProfile>, LookupError> {
        let key = normalize(name);
        if let Some(profile) = self.drugs.get(&key) {
            return Ok(Some(profile.clone()));
        }
        let first = key.split_whitespace().next().unwrap_or_default();
        Ok(self.drugs.get(first).cloned())
    }

    async fn state_rules(&self, state: &str) -> Result<Option<StateRules>, LookupError> {
        Ok(self.states.get(&normalize(state)).cloned())
    }
}

/// Wraps a lookup and fails its first `failures` calls with `Unavailable`.
///
/// Models a registry outage: with a small count the orchestrator's retries
/// ride it out, with a large one every lookup-backed check ends inconclusive.
pub struct FlakyLookup {
    inner: Arc<dyn ReferenceLookup>,
    failures: u32,
    calls: AtomicU32,
}

impl FlakyLookup {
    pub fn new(inner: Arc<dyn ReferenceLookup>, failures: u32) -> Self {
        Self {
            inner,
            failures,
            calls: AtomicU32::new(0),
        }
    }

    /// Calls received so far, failed ones included.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn gate(&self, what: &str) -> Result<(), LookupError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            debug!(call, what, "simulated registry outage");
            return Err(LookupError::Unavailable {
                reason: format!("{what} registry did not respond"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ReferenceLookup for FlakyLookup {
    async fn license(
        &self,
        license_number: &str,
        state: &str,
    ) -> Result<Option<LicenseRecord>, LookupError> {
        self.gate("license")?;
        self.inner.license(license_number, state).await
    }

    async fn dea_registration(&self, dea_number: &str) -> Result<Option<DeaRecord>, LookupError> {
        self.gate("DEA")?;
        self.inner.dea_registration(dea_number).await
    }

    async fn drug_profile(&self, name: &str) -> Result<Option<DrugProfile>, LookupError> {
        self.gate("drug compendium")?;
        self.inner.drug_profile(name).await
    }

    async fn state_rules(&self, state: &str) -> Result<Option<StateRules>, LookupError> {
        self.gate("state rules")?;
        self.inner.state_rules(state).await
    }
}

fn normalize(s: &str) -> String {
    s.trim().to_ascii_lowercase()
}

fn date((y, m, d): (i32, u32, u32)) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default()
}

fn license(
    number: &str,
    state: &str,
    holder: &str,
    npi: Option<&str>,
    status: LicenseStatus,
    expires: (i32, u32, u32),
) -> LicenseRecord {
    LicenseRecord {
        license_number: number.to_string(),
        state: state.to_string(),
        holder_name: holder.to_string(),
        npi: npi.map(str::to_string),
        status,
        expires: date(expires),
    }
}

fn dea(number: &str, registrant: &str, schedules: Vec<Schedule>, expires: (i32, u32, u32)) -> DeaRecord {
    DeaRecord {
        dea_number: number.to_string(),
        registrant_name: registrant.to_string(),
        schedules,
        expires: date(expires),
    }
}

fn drug(name: &str, schedule: Option<Schedule>, max_daily_mg: Option<f64>) -> DrugProfile {
    DrugProfile {
        name: name.to_string(),
        schedule,
        max_daily_mg,
        compounding_prohibited: false,
    }
}

fn state(
    code: &str,
    prescription_valid_days: u32,
    max_refills: u32,
    schedule_ii_max_days_supply: u32,
    requires_patient_address: bool,
) -> StateRules {
    StateRules {
        state: code.to_string(),
        prescription_valid_days,
        max_refills,
        schedule_ii_max_days_supply,
        requires_patient_address,
    }
}
