//! The fixed set of check units a pipeline runs.

use std::collections::BTreeMap;
use std::sync::Arc;

use rxsentinel_contracts::{
    check::CheckKind,
    error::{SentinelError, SentinelResult},
};

use crate::traits::CheckUnit;

/// Exactly one unit per `CheckKind`.
///
/// Construction fails if a kind is missing or supplied twice, so a pipeline
/// that would silently skip a check cannot be built.
#[derive(Clone)]
pub struct CheckRegistry {
    units: BTreeMap<CheckKind, Arc<dyn CheckUnit>>,
}

impl CheckRegistry {
    pub fn new(units: Vec<Arc<dyn CheckUnit>>) -> SentinelResult<Self> {
        let mut map: BTreeMap<CheckKind, Arc<dyn CheckUnit>> = BTreeMap::new();
        for unit in units {
            let kind = unit.kind();
            if map.insert(kind, unit).is_some() {
                return Err(SentinelError::RegistryError {
                    reason: format!("check '{kind}' registered more than once"),
                });
            }
        }

        let missing: Vec<&str> = CheckKind::ALL
            .into_iter()
            .filter(|k| !map.contains_key(k))
            .map(CheckKind::name)
            .collect();
        if !missing.is_empty() {
            return Err(SentinelError::RegistryError {
                reason: format!("no unit registered for: {}", missing.join(", ")),
            });
        }

        Ok(Self { units: map })
    }

    pub fn unit(&self, kind: CheckKind) -> Arc<dyn CheckUnit> {
        // Construction guarantees every kind is present.
        Arc::clone(&self.units[&kind])
    }
}
