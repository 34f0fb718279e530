//! Record stores for finalized cases.
//!
//! - `InMemoryRecordStore`: keeps cases in a map; used by tests and scenarios.
//! - `JsonFileRecordStore`: one pretty-printed JSON file per case, named
//!   after the escaped case id and verified as a case document before it is
//!   written.
//!
//! Both can list what they hold as `CaseRecord`s. The pipeline itself only
//! ever calls `save`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use rxsentinel_contracts::{
    case::{ApprovalStatus, CaseId, CaseResult},
    check::Severity,
    error::{SentinelError, SentinelResult},
};
use rxsentinel_core::traits::RecordStore;
use rxsentinel_verify::ensure_valid_case_document;

/// One line of a case listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseRecord {
    pub case_id: CaseId,
    pub approval_status: ApprovalStatus,
    pub confidence_score: f64,
    pub critical_alerts: usize,
    pub warning_alerts: usize,
    pub prescriber: Option<String>,
    pub patient: Option<String>,
}

impl From<&CaseResult> for CaseRecord {
    fn from(case: &CaseResult) -> Self {
        Self {
            case_id: case.case_id.clone(),
            approval_status: case.approval_status,
            confidence_score: case.confidence_score,
            critical_alerts: case.alert_count(Severity::Critical),
            warning_alerts: case.alert_count(Severity::Warning),
            prescriber: case
                .prescription_data
                .as_ref()
                .map(|p| p.prescriber.name.clone()),
            patient: case.prescription_data.as_ref().map(|p| p.patient.name.clone()),
        }
    }
}

fn store_error(reason: impl Into<String>) -> SentinelError {
    SentinelError::StoreError {
        reason: reason.into(),
    }
}

// ── In-memory ────────────────────────────────────────────────────────────────

/// Thread-safe in-memory case store. Saving the same case id again replaces
/// the earlier case.
#[derive(Default)]
pub struct InMemoryRecordStore {
    cases: Mutex<BTreeMap<CaseId, CaseResult>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, case_id: &CaseId) -> SentinelResult<Option<CaseResult>> {
        let cases = self
            .cases
            .lock()
            .map_err(|e| store_error(format!("lock poisoned: {e}")))?;
        Ok(cases.get(case_id).cloned())
    }

    pub fn list(&self) -> SentinelResult<Vec<CaseRecord>> {
        let cases = self
            .cases
            .lock()
            .map_err(|e| store_error(format!("lock poisoned: {e}")))?;
        Ok(cases.values().map(CaseRecord::from).collect())
    }

    pub fn len(&self) -> usize {
        self.cases.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn save(&self, case: &CaseResult) -> SentinelResult<CaseId> {
        let mut cases = self
            .cases
            .lock()
            .map_err(|e| store_error(format!("lock poisoned: {e}")))?;
        cases.insert(case.case_id.clone(), case.clone());
        debug!(case_id = %case.case_id, "case stored in memory");
        Ok(case.case_id.clone())
    }
}

// ── JSON files ───────────────────────────────────────────────────────────────

/// Writes each case to `<dir>/<case_id>.json`.
pub struct JsonFileRecordStore {
    dir: PathBuf,
}

impl JsonFileRecordStore {
    /// Create the store, creating `dir` if needed.
    pub fn new(dir: impl Into<PathBuf>) -> SentinelResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| {
            store_error(format!("cannot create directory '{}': {e}", dir.display()))
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where the case with `case_id` is (or would be) stored.
    ///
    /// `[A-Za-z0-9-]` is kept as is; every other byte, `_` included, is
    /// written as `_xx` (lowercase hex). Distinct ids always get distinct
    /// files, and an empty id is stored as `_.json`.
    pub fn path_for(&self, case_id: &CaseId) -> PathBuf {
        let id = case_id.as_str();
        if id.is_empty() {
            return self.dir.join("_.json");
        }
        let mut file_stem = String::with_capacity(id.len());
        for byte in id.bytes() {
            if byte.is_ascii_alphanumeric() || byte == b'-' {
                file_stem.push(char::from(byte));
            } else {
                file_stem.push('_');
                file_stem.push_str(&hex::encode([byte]));
            }
        }
        self.dir.join(format!("{file_stem}.json"))
    }

    /// Read a stored case back.
    pub async fn load(&self, case_id: &CaseId) -> SentinelResult<CaseResult> {
        let path = self.path_for(case_id);
        let contents = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| store_error(format!("cannot read '{}': {e}", path.display())))?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Every readable case in the directory, ordered by case id. Files that
    /// don't parse as cases are skipped with a warning.
    pub async fn list(&self) -> SentinelResult<Vec<CaseRecord>> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| store_error(format!("cannot list '{}': {e}", self.dir.display())))?;

        let mut records = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| store_error(e.to_string()))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let parsed = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| e.to_string())
                .and_then(|s| serde_json::from_str::<CaseResult>(&s).map_err(|e| e.to_string()));
            match parsed {
                Ok(case) => records.push(CaseRecord::from(&case)),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable case file"),
            }
        }
        records.sort_by(|a, b| a.case_id.cmp(&b.case_id));
        Ok(records)
    }
}

#[async_trait]
impl RecordStore for JsonFileRecordStore {
    async fn save(&self, case: &CaseResult) -> SentinelResult<CaseId> {
        let document = serde_json::to_value(case)?;
        ensure_valid_case_document(&document)?;

        let path = self.path_for(&case.case_id);
        let pretty = serde_json::to_string_pretty(&document)?;
        tokio::fs::write(&path, pretty)
            .await
            .map_err(|e| store_error(format!("cannot write '{}': {e}", path.display())))?;

        info!(case_id = %case.case_id, path = %path.display(), "case written");
        Ok(case.case_id.clone())
    }
}
