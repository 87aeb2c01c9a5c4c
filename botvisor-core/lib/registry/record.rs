use std::{collections::BTreeMap, fmt};

use getset::Getters;
use serde::{Deserialize, Serialize};
use typed_path::Utf8UnixPathBuf;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The full mapping of unit name to record, ordered by name.
pub type Registry = BTreeMap<String, UnitRecord>;

/// The durable status of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitStatus {
    /// The unit is not running.
    Stopped,

    /// The unit has been started.
    Running,
}

/// The observable state of a unit.
///
/// `Starting` only exists in memory while a start is installing dependencies or waiting out the
/// startup grace period; the durable status is still [`UnitStatus::Stopped`] at that point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitState {
    /// The unit is not running.
    Stopped,

    /// A start is in progress.
    Starting,

    /// The unit is running.
    Running,
}

/// One managed unit.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Getters)]
#[getset(get = "pub with_prefix")]
pub struct UnitRecord {
    /// The secret the unit authenticates with.
    #[serde(rename = "token")]
    credential: String,

    /// The durable status.
    status: UnitStatus,

    /// The entry point, always in forward-slash form.
    #[serde(rename = "filePath", with = "entry_path_serde")]
    entry_path: Utf8UnixPathBuf,

    /// The process id of the running unit, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pid: Option<u32>,
}

/// What listing a unit reveals. Never includes the credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitSummary {
    /// The unit name.
    pub name: String,

    /// The observable state.
    pub state: UnitState,

    /// The entry point.
    pub entry_path: String,

    /// The process id, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl UnitRecord {
    /// Creates a stopped record.
    pub fn new(credential: impl Into<String>, entry_path: &str) -> Self {
        Self {
            credential: credential.into(),
            status: UnitStatus::Stopped,
            entry_path: botvisor_utils::to_unix_path(entry_path),
            pid: None,
        }
    }

    /// Whether the durable status is running.
    pub fn is_running(&self) -> bool {
        self.status == UnitStatus::Running
    }

    /// The working directory of the unit, the parent of its entry point.
    pub fn get_working_dir(&self) -> Utf8UnixPathBuf {
        self.entry_path
            .parent()
            .map(|parent| parent.to_path_buf())
            .unwrap_or_else(|| Utf8UnixPathBuf::from("."))
    }

    pub(crate) fn mark_running(&mut self, pid: Option<u32>) {
        self.status = UnitStatus::Running;
        self.pid = pid;
    }

    pub(crate) fn mark_stopped(&mut self) {
        self.status = UnitStatus::Stopped;
        self.pid = None;
    }
}

impl UnitState {
    /// Lower-case display name.
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitState::Stopped => "stopped",
            UnitState::Starting => "starting",
            UnitState::Running => "running",
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl fmt::Debug for UnitRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitRecord")
            .field("credential", &"<redacted>")
            .field("status", &self.status)
            .field("entry_path", &self.entry_path)
            .field("pid", &self.pid)
            .finish()
    }
}

impl fmt::Display for UnitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//--------------------------------------------------------------------------------------------------
// Modules
//--------------------------------------------------------------------------------------------------

/// Normalizes entry paths to forward slashes both when writing and when reading.
mod entry_path_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use typed_path::Utf8UnixPathBuf;

    pub fn serialize<S>(path: &Utf8UnixPathBuf, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&botvisor_utils::normalize_separators(path.as_str()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Utf8UnixPathBuf, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(botvisor_utils::to_unix_path(&raw))
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_reads_legacy_document_shape() {
        let json = r#"{ "token": "tok123", "status": "running", "filePath": "bots\\alpha\\index.js" }"#;
        let record: UnitRecord = serde_json::from_str(json).unwrap();

        assert_eq!(record.get_credential(), "tok123");
        assert_eq!(*record.get_status(), UnitStatus::Running);
        assert_eq!(record.get_entry_path().as_str(), "bots/alpha/index.js");
        assert_eq!(*record.get_pid(), None);
        assert_eq!(record.get_working_dir().as_str(), "bots/alpha");
    }

    #[test]
    fn test_record_writes_forward_slashes_and_omits_missing_pid() {
        let record = UnitRecord::new("tok123", r"bots\alpha\index.js");
        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(
            value,
            serde_json::json!({
                "token": "tok123",
                "status": "stopped",
                "filePath": "bots/alpha/index.js"
            })
        );
    }

    #[test]
    fn test_debug_redacts_credential() {
        let record = UnitRecord::new("super-secret", "bots/alpha/index.js");
        let debug = format!("{:?}", record);

        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_status_transitions_clear_pid() {
        let mut record = UnitRecord::new("tok", "bots/alpha/index.js");
        record.mark_running(Some(42));
        assert!(record.is_running());
        assert_eq!(*record.get_pid(), Some(42));

        record.mark_stopped();
        assert!(!record.is_running());
        assert_eq!(*record.get_pid(), None);
    }
}
