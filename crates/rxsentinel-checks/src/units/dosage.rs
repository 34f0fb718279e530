//! Daily dose against the compendium maximum, and days-supply consistency.
//!
//! Directions are read with a small phrase parser: the number before a
//! dosage-unit word is the amount per dose, and the frequency comes from
//! phrases like "twice daily", "every 6 hours", or the usual abbreviations.
//! Directions it cannot read are reported, not guessed at.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use rxsentinel_contracts::{
    check::{CheckKind, CheckResult, CheckStatus, DependencyResults, Finding},
    error::CheckError,
    prescription::PrescriptionData,
};
use rxsentinel_core::traits::CheckUnit;

use super::{dependency_status, status_from};
use crate::lookup::ReferenceLookup;

/// Fraction of the maximum daily dose above which a dose is flagged.
const NEAR_MAXIMUM: f64 = 0.8;
/// Allowed relative gap between written and computed days supply.
const DAYS_SUPPLY_TOLERANCE: f64 = 0.25;

const UNIT_WORDS: [&str; 12] = [
    "tablet", "tablets", "tab", "tabs", "capsule", "capsules", "cap", "caps", "pill", "pills",
    "puff", "puffs",
];

/// What the directions say about one dose.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DoseSchedule {
    pub units_per_dose: f64,
    pub doses_per_day: f64,
    pub as_needed: bool,
}

impl DoseSchedule {
    pub fn units_per_day(&self) -> f64 {
        self.units_per_dose * self.doses_per_day
    }
}

/// Strength per unit in milligrams: "10 mg", "0.5mg", "1 g", "250 mcg".
pub fn parse_strength_mg(strength: &str) -> Option<f64> {
    let s = strength.trim().to_ascii_lowercase();
    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let value: f64 = s[..split].parse().ok()?;
    let unit = s[split..].trim_start();
    if unit.starts_with("mcg") || unit.starts_with("µg") {
        Some(value / 1000.0)
    } else if unit.starts_with("mg") {
        Some(value)
    } else if unit.starts_with('g') {
        Some(value * 1000.0)
    } else {
        None
    }
}

fn number_word(word: &str) -> Option<f64> {
    match word {
        "a" | "an" | "one" => Some(1.0),
        "half" => Some(0.5),
        "two" => Some(2.0),
        "three" => Some(3.0),
        "four" => Some(4.0),
        w => w.parse().ok(),
    }
}

/// Parse directions into a dose schedule. `None` when either the amount or
/// the frequency can't be read.
pub fn parse_directions(directions: &str) -> Option<DoseSchedule> {
    let text = directions.to_ascii_lowercase();
    let words: Vec<&str> = text
        .split(|c: char| c.is_whitespace() || c == ',' || c == ';')
        .filter(|w| !w.is_empty())
        .collect();

    let units_per_dose = words
        .windows(2)
        .find(|pair| UNIT_WORDS.contains(&pair[1]))
        .and_then(|pair| number_word(pair[0]))?;

    let has = |phrase: &str| text.contains(phrase);
    let has_word = |word: &str| words.contains(&word);
    let every_hours = words
        .windows(3)
        .find(|w| w[0] == "every" && w[2].starts_with("hour"))
        .and_then(|w| w[1].parse::<f64>().ok())
        .filter(|h| *h > 0.0);

    let doses_per_day = if has("four times") || has("4 times") || has_word("qid") {
        4.0
    } else if has("three times") || has("3 times") || has_word("tid") {
        3.0
    } else if has("twice") || has("two times") || has("2 times") || has_word("bid") {
        2.0
    } else if let Some(hours) = every_hours {
        24.0 / hours
    } else if has("every hour") {
        24.0
    } else if has("once") || has("daily") || has("every day") || has("every morning")
        || has("every evening") || has("at bedtime") || has("nightly") || has_word("qd")
        || has_word("qhs")
    {
        1.0
    } else {
        return None;
    };

    Some(DoseSchedule {
        units_per_dose,
        doses_per_day,
        as_needed: has("as needed") || has_word("prn"),
    })
}

pub struct DosageMonitoringUnit {
    lookup: Arc<dyn ReferenceLookup>,
}

impl DosageMonitoringUnit {
    pub fn new(lookup: Arc<dyn ReferenceLookup>) -> Self {
        Self { lookup }
    }
}

#[async_trait]
impl CheckUnit for DosageMonitoringUnit {
    fn kind(&self) -> CheckKind {
        CheckKind::DosageMonitoring
    }

    async fn evaluate(
        &self,
        prescription: &PrescriptionData,
        dependencies: &DependencyResults,
    ) -> Result<CheckResult, CheckError> {
        if prescription.medications.is_empty() {
            return Err(CheckError::terminal("prescription lists no medications"));
        }

        let mut findings = Vec::new();
        let mut evidence = Vec::<Value>::new();
        let mut unreadable = false;

        for med in prescription.medications.iter().filter(|m| !m.is_compound()) {
            let schedule = med.directions.as_deref().and_then(parse_directions);
            if schedule.is_none() {
                unreadable = true;
                findings.push(Finding::warning(
                    "directions-unreadable",
                    format!("could not read a dose and frequency for {}", med.name),
                ));
            }

            if let (Some(schedule), Some(quantity), Some(days)) =
                (schedule, med.quantity, med.days_supply)
            {
                if !schedule.as_needed && days > 0 {
                    let computed = f64::from(quantity) / schedule.units_per_day();
                    let gap = (computed - f64::from(days)).abs() / f64::from(days);
                    if gap > DAYS_SUPPLY_TOLERANCE {
                        findings.push(Finding::warning(
                            "days-supply-mismatch",
                            format!(
                                "{}: quantity {quantity} lasts {computed:.0} days at the written dose, not {days}",
                                med.name
                            ),
                        ));
                    }
                }
            }

            let max_daily_mg = self
                .lookup
                .drug_profile(&med.name)
                .await?
                .and_then(|p| p.max_daily_mg);
            let Some(max_daily_mg) = max_daily_mg else {
                findings.push(Finding::info(
                    "no-dosing-limit",
                    format!("no maximum daily dose on file for {}", med.name),
                ));
                continue;
            };
            let Some(strength_mg) = med.strength.as_deref().and_then(parse_strength_mg) else {
                unreadable = true;
                findings.push(Finding::warning(
                    "strength-unreadable",
                    format!("could not read a strength in mg for {}", med.name),
                ));
                continue;
            };
            let Some(schedule) = schedule else {
                continue;
            };

            let daily_mg = schedule.units_per_day() * strength_mg;
            if daily_mg > max_daily_mg {
                findings.push(Finding::critical(
                    "dose-exceeds-maximum",
                    format!(
                        "{}: {daily_mg:.1} mg/day exceeds the {max_daily_mg} mg/day maximum",
                        med.name
                    ),
                ));
            } else if daily_mg > NEAR_MAXIMUM * max_daily_mg {
                findings.push(Finding::warning(
                    "dose-near-maximum",
                    format!(
                        "{}: {daily_mg:.1} mg/day is close to the {max_daily_mg} mg/day maximum",
                        med.name
                    ),
                ));
            }
            evidence.push(json!({
                "name": med.name,
                "units_per_day": schedule.units_per_day(),
                "daily_mg": daily_mg,
                "max_daily_mg": max_daily_mg,
                "as_needed": schedule.as_needed,
            }));
        }

        let prescriber_verified = [CheckKind::License, CheckKind::Dea]
            .into_iter()
            .all(|k| dependency_status(dependencies, k) == Some(CheckStatus::Pass));
        let mut confidence: f64 = if unreadable { 0.6 } else { 0.9 };
        if !prescriber_verified {
            confidence -= 0.1;
        }

        Ok(CheckResult::new(
            CheckKind::DosageMonitoring,
            status_from(&findings),
            findings,
            confidence,
        )
        .with_evidence(json!({
            "doses": evidence,
            "prescriber_verified": prescriber_verified,
        })))
    }
}
