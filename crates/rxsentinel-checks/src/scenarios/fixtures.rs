//! Fictional prescriptions used by the scenarios and the unit tests.
//!
//! Prescribers match the entries in `mock_data`. No real patient or
//! prescriber identifiers appear here.

use chrono::NaiveDate;

use rxsentinel_contracts::prescription::{
    Compounding, Ingredient, Medication, Patient, PreparationKind, Prescriber, PrescriptionData,
};

/// `clean_prescription()` as a labelled plain-text form.
pub const CLEAN_DOCUMENT: &str = "\
Prescriber: Dr. Alicia Rivera
NPI: 1234567893
License: A123456
License State: CA
DEA: AR1234563

Patient: Jordan Ellis
DOB: 1978-04-12
Address: 1420 Alder St, Sacramento, CA 95814

Date Written: 2026-03-02
Date Received: 2026-03-03
Fill Date: 2026-03-04
Diagnosis: Type 2 diabetes mellitus; essential hypertension

Medication: Lisinopril
Strength: 10 mg
Form: tablet
Quantity: 30
Days Supply: 30
Directions: take 1 tablet by mouth once daily
Refills: 3

Medication: Metformin
Strength: 500 mg
Form: tablet
Quantity: 60
Days Supply: 30
Directions: take 1 tablet by mouth twice daily with meals
Refills: 3

Signature: signed
";

fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default()
}

fn rivera() -> Prescriber {
    Prescriber {
        name: "Dr. Alicia Rivera".to_string(),
        npi: Some("1234567893".to_string()),
        license_number: Some("A123456".to_string()),
        license_state: Some("CA".to_string()),
        dea_number: Some("AR1234563".to_string()),
    }
}

fn ellis() -> Patient {
    Patient {
        name: "Jordan Ellis".to_string(),
        date_of_birth: Some(ymd(1978, 4, 12)),
        address: Some("1420 Alder St, Sacramento, CA 95814".to_string()),
    }
}

fn tablet(name: &str, strength: &str, quantity: u32, days: u32, directions: &str, refills: u32) -> Medication {
    Medication {
        name: name.to_string(),
        strength: Some(strength.to_string()),
        dosage_form: Some("tablet".to_string()),
        quantity: Some(quantity),
        days_supply: Some(days),
        directions: Some(directions.to_string()),
        refills,
        compounding: None,
    }
}

/// Two maintenance medications from an active CA prescriber. Every check passes.
pub fn clean_prescription() -> PrescriptionData {
    PrescriptionData {
        prescriber: rivera(),
        patient: ellis(),
        medications: vec![
            tablet("Lisinopril", "10 mg", 30, 30, "take 1 tablet by mouth once daily", 3),
            tablet(
                "Metformin",
                "500 mg",
                60,
                30,
                "take 1 tablet by mouth twice daily with meals",
                3,
            ),
        ],
        date_written: Some(ymd(2026, 3, 2)),
        date_received: Some(ymd(2026, 3, 3)),
        fill_date: Some(ymd(2026, 3, 4)),
        diagnosis: Some("Type 2 diabetes mellitus; essential hypertension".to_string()),
        signature_present: true,
    }
}

/// Written by a prescriber whose CA license lapsed in 2025.
pub fn expired_license_prescription() -> PrescriptionData {
    PrescriptionData {
        prescriber: Prescriber {
            name: "Dr. Priya Patel".to_string(),
            npi: Some("1588776655".to_string()),
            license_number: Some("G998877".to_string()),
            license_state: Some("CA".to_string()),
            dea_number: None,
        },
        medications: vec![tablet(
            "Atorvastatin",
            "20 mg",
            30,
            30,
            "take 1 tablet by mouth at bedtime",
            5,
        )],
        diagnosis: Some("Hyperlipidemia".to_string()),
        ..clean_prescription()
    }
}

/// A short oxycodone course from a prescriber registered for schedule II.
pub fn controlled_prescription() -> PrescriptionData {
    PrescriptionData {
        medications: vec![tablet(
            "Oxycodone",
            "5 mg",
            20,
            5,
            "take 1 tablet by mouth every 6 hours as needed for pain",
            0,
        )],
        diagnosis: Some("Acute post-operative pain".to_string()),
        ..clean_prescription()
    }
}

/// Oxycodone with a refill, under a registration that lacks schedule II.
pub fn unauthorized_controlled_prescription() -> PrescriptionData {
    let mut rx = controlled_prescription();
    rx.prescriber = Prescriber {
        name: "Dr. Benjamin Chen".to_string(),
        npi: Some("1467583920".to_string()),
        license_number: Some("MD-44821".to_string()),
        license_state: Some("NY".to_string()),
        dea_number: Some("BC2468139".to_string()),
    };
    rx.medications[0].refills = 1;
    rx
}

/// A topical NSAID cream compounded in-house with a 28 day BUD.
pub fn compounded_prescription() -> PrescriptionData {
    PrescriptionData {
        medications: vec![Medication {
            name: "Ketoprofen 10% / Lidocaine 5% cream".to_string(),
            strength: None,
            dosage_form: Some("cream".to_string()),
            quantity: Some(60),
            days_supply: Some(20),
            directions: Some("apply 1 gram to the affected knee three times daily".to_string()),
            refills: 1,
            compounding: Some(Compounding {
                preparation: Some(PreparationKind::NonSterileAqueous),
                ingredients: vec![
                    Ingredient {
                        name: "Ketoprofen".to_string(),
                        strength: Some("10%".to_string()),
                    },
                    Ingredient {
                        name: "Lidocaine".to_string(),
                        strength: Some("5%".to_string()),
                    },
                ],
                compounded_date: Some(ymd(2026, 3, 4)),
                beyond_use_date: Some(ymd(2026, 4, 1)),
            }),
        }],
        diagnosis: Some("Osteoarthritis of the right knee".to_string()),
        ..clean_prescription()
    }
}
