//! Structured prescription data produced by the extraction service.
//!
//! A `PrescriptionData` is immutable once extracted. Every check unit reads
//! it; none may modify it. Fields the extractor could not find are `None`
//! (or empty) rather than guessed, so checks can tell "absent" from "wrong".

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// The prescriber as identified on the document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Prescriber {
    /// Full name as printed, e.g. "Dr. Alicia Rivera".
    pub name: String,
    /// National Provider Identifier, if printed.
    #[serde(default)]
    pub npi: Option<String>,
    /// State license number.
    #[serde(default)]
    pub license_number: Option<String>,
    /// Two-letter state code of the license (e.g. "CA").
    #[serde(default)]
    pub license_state: Option<String>,
    /// DEA registration number, required for controlled substances.
    #[serde(default)]
    pub dea_number: Option<String>,
}

/// The patient the prescription is written for.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub name: String,
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default)]
    pub address: Option<String>,
}

/// How a compounded preparation is classified for beyond-use dating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreparationKind {
    NonSterileAqueous,
    NonSterileNonAqueous,
    NonSterileSolid,
    Sterile,
}

/// One ingredient of a compounded preparation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ingredient {
    pub name: String,
    #[serde(default)]
    pub strength: Option<String>,
}

/// Compounding details, present only for compounded medications.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Compounding {
    #[serde(default)]
    pub preparation: Option<PreparationKind>,
    #[serde(default)]
    pub ingredients: Vec<Ingredient>,
    #[serde(default)]
    pub compounded_date: Option<NaiveDate>,
    #[serde(default)]
    pub beyond_use_date: Option<NaiveDate>,
}

/// A single medication line on the prescription.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Medication {
    /// Drug name as written (brand or generic).
    pub name: String,
    /// Strength per unit, e.g. "10 mg".
    #[serde(default)]
    pub strength: Option<String>,
    /// Dosage form, e.g. "tablet", "cream".
    #[serde(default)]
    pub dosage_form: Option<String>,
    /// Quantity to dispense, in units of the dosage form.
    #[serde(default)]
    pub quantity: Option<u32>,
    #[serde(default)]
    pub days_supply: Option<u32>,
    /// Directions for use ("sig"), e.g. "take 1 tablet twice daily".
    #[serde(default)]
    pub directions: Option<String>,
    #[serde(default)]
    pub refills: u32,
    /// Present when the medication is a compounded preparation.
    #[serde(default)]
    pub compounding: Option<Compounding>,
}

impl Medication {
    /// True when this line describes a compounded preparation.
    pub fn is_compound(&self) -> bool {
        self.compounding.is_some()
    }
}

/// Everything the extraction service could read off a prescription document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrescriptionData {
    pub prescriber: Prescriber,
    pub patient: Patient,
    #[serde(default)]
    pub medications: Vec<Medication>,
    #[serde(default)]
    pub date_written: Option<NaiveDate>,
    /// Date the pharmacy received the prescription.
    #[serde(default)]
    pub date_received: Option<NaiveDate>,
    #[serde(default)]
    pub fill_date: Option<NaiveDate>,
    #[serde(default)]
    pub diagnosis: Option<String>,
    #[serde(default)]
    pub signature_present: bool,
}

impl PrescriptionData {
    /// The date checks evaluate "as of".
    ///
    /// Fill date, then received date, then written date. Checks never read the
    /// wall clock, so re-running a case yields the same verdict.
    pub fn reference_date(&self) -> Option<NaiveDate> {
        self.fill_date.or(self.date_received).or(self.date_written)
    }

    /// Iterate over the compounded medication lines only.
    pub fn compounds(&self) -> impl Iterator<Item = (&Medication, &Compounding)> {
        self.medications
            .iter()
            .filter_map(|m| m.compounding.as_ref().map(|c| (m, c)))
    }
}
