//! Reference extraction service.
//!
//! `DocumentExtractor` accepts either a JSON prescription document (the
//! serialized form of `PrescriptionData`) or a labelled plain-text form:
//!
//! ```text
//! Prescriber: Dr. Alicia Rivera
//! License: A123456
//! Patient: Jordan Ellis
//! Medication: Lisinopril
//! Strength: 10 mg
//! Directions: take 1 tablet by mouth once daily
//! ```
//!
//! Labels are case-insensitive. Each `Medication:` line starts a new
//! medication; the medication labels that follow apply to it. Compounding
//! labels (`Preparation`, `Ingredient`, `Compounded`, `BUD`) turn the current
//! medication into a compounded preparation. Unknown labels are ignored.

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::debug;

use rxsentinel_contracts::{
    error::ExtractionError,
    prescription::{Compounding, Ingredient, Medication, PreparationKind, PrescriptionData},
};
use rxsentinel_core::traits::ExtractionService;

#[derive(Debug, Default, Clone, Copy)]
pub struct DocumentExtractor;

impl DocumentExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Synchronous extraction, shared by the async trait method.
    pub fn parse(&self, document: &[u8]) -> Result<PrescriptionData, ExtractionError> {
        let text = std::str::from_utf8(document).map_err(|_| ExtractionError::NotText)?;
        let text = text.trim();
        if text.is_empty() {
            return Err(ExtractionError::EmptyDocument);
        }
        let data = if text.starts_with('{') {
            serde_json::from_str::<PrescriptionData>(text).map_err(|e| {
                ExtractionError::Unparseable {
                    reason: format!("invalid JSON prescription: {e}"),
                }
            })?
        } else {
            parse_labelled(text)?
        };

        if data.prescriber.name.trim().is_empty() {
            return Err(ExtractionError::MissingField {
                field: "prescriber".to_string(),
            });
        }
        if data.patient.name.trim().is_empty() {
            return Err(ExtractionError::MissingField {
                field: "patient".to_string(),
            });
        }
        Ok(data)
    }
}

#[async_trait]
impl ExtractionService for DocumentExtractor {
    async fn extract(&self, document: &[u8]) -> Result<PrescriptionData, ExtractionError> {
        self.parse(document)
    }
}

fn unparseable(reason: String) -> ExtractionError {
    ExtractionError::Unparseable { reason }
}

fn parse_date(label: &str, value: &str) -> Result<NaiveDate, ExtractionError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(value, "%m/%d/%Y"))
        .map_err(|_| unparseable(format!("{label}: '{value}' is not a date")))
}

fn parse_count(label: &str, value: &str) -> Result<u32, ExtractionError> {
    value
        .parse()
        .map_err(|_| unparseable(format!("{label}: '{value}' is not a whole number")))
}

fn parse_preparation(value: &str) -> Result<PreparationKind, ExtractionError> {
    let normalized: String = value
        .to_ascii_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .collect();
    match normalized.as_str() {
        "nonsterileaqueous" | "aqueous" => Ok(PreparationKind::NonSterileAqueous),
        "nonsterilenonaqueous" | "nonaqueous" => Ok(PreparationKind::NonSterileNonAqueous),
        "nonsterilesolid" | "solid" => Ok(PreparationKind::NonSterileSolid),
        "sterile" => Ok(PreparationKind::Sterile),
        _ => Err(unparseable(format!("Preparation: unknown class '{value}'"))),
    }
}

/// "Ketoprofen 10%" -> name "Ketoprofen", strength "10%".
fn parse_ingredient(value: &str) -> Ingredient {
    match value.rsplit_once(' ') {
        Some((name, strength)) if strength.starts_with(|c: char| c.is_ascii_digit()) => {
            Ingredient {
                name: name.trim().to_string(),
                strength: Some(strength.to_string()),
            }
        }
        _ => Ingredient {
            name: value.to_string(),
            strength: None,
        },
    }
}

fn parse_labelled(text: &str) -> Result<PrescriptionData, ExtractionError> {
    let mut data = PrescriptionData::default();
    let mut recognized = 0usize;

    for line in text.lines() {
        let Some((label, value)) = line.split_once(':') else {
            continue;
        };
        let label = label.trim().to_ascii_lowercase();
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        recognized += 1;

        if label == "medication" {
            data.medications.push(Medication {
                name: value.to_string(),
                ..Default::default()
            });
            continue;
        }

        match label.as_str() {
            "prescriber" => data.prescriber.name = value.to_string(),
            "npi" => data.prescriber.npi = Some(value.to_string()),
            "license" => data.prescriber.license_number = Some(value.to_string()),
            "license state" => data.prescriber.license_state = Some(value.to_ascii_uppercase()),
            "dea" => data.prescriber.dea_number = Some(value.to_string()),
            "patient" => data.patient.name = value.to_string(),
            "dob" | "date of birth" => data.patient.date_of_birth = Some(parse_date("DOB", value)?),
            "address" => data.patient.address = Some(value.to_string()),
            "date written" | "date" => data.date_written = Some(parse_date("Date Written", value)?),
            "date received" => data.date_received = Some(parse_date("Date Received", value)?),
            "fill date" => data.fill_date = Some(parse_date("Fill Date", value)?),
            "diagnosis" => data.diagnosis = Some(value.to_string()),
            "signature" => {
                data.signature_present =
                    matches!(value.to_ascii_lowercase().as_str(), "signed" | "yes" | "present")
            }
            _ => {
                let Some(med) = data.medications.last_mut() else {
                    recognized -= 1;
                    debug!(label, "ignoring label outside any medication");
                    continue;
                };
                if !apply_medication_label(med, &label, value)? {
                    recognized -= 1;
                    debug!(label, "ignoring unknown label");
                }
            }
        }
    }

    if recognized == 0 {
        return Err(unparseable("no labelled fields found".to_string()));
    }
    Ok(data)
}

/// Returns `false` when the label is not a medication label.
fn apply_medication_label(
    med: &mut Medication,
    label: &str,
    value: &str,
) -> Result<bool, ExtractionError> {
    match label {
        "strength" => med.strength = Some(value.to_string()),
        "form" | "dosage form" => med.dosage_form = Some(value.to_string()),
        "quantity" | "qty" => med.quantity = Some(parse_count("Quantity", value)?),
        "days supply" => med.days_supply = Some(parse_count("Days Supply", value)?),
        "directions" | "sig" => med.directions = Some(value.to_string()),
        "refills" => med.refills = parse_count("Refills", value)?,
        "preparation" => {
            med.compounding.get_or_insert_with(Compounding::default).preparation =
                Some(parse_preparation(value)?)
        }
        "ingredient" => med
            .compounding
            .get_or_insert_with(Compounding::default)
            .ingredients
            .push(parse_ingredient(value)),
        "compounded" | "compounded date" => {
            med.compounding.get_or_insert_with(Compounding::default).compounded_date =
                Some(parse_date("Compounded", value)?)
        }
        "bud" | "beyond use date" => {
            med.compounding.get_or_insert_with(Compounding::default).beyond_use_date =
                Some(parse_date("BUD", value)?)
        }
        _ => return Ok(false),
    }
    Ok(true)
}
