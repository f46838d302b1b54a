use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;
use ts_rs::TS;

use crate::time::now_iso;

pub const FLEET_SCHEMA_VERSION: u32 = 1;

/// Record keys a patch may never touch.
const IMMUTABLE_KEYS: [&str; 2] = ["id", "createdAt"];

/// Lifecycle state reported for an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "kebab-case")]
#[ts(export)]
pub enum InstanceStatus {
    Running,
    NeedsSetup,
    Building,
    Deploying,
    Failed,
    Unhealthy,
    Stopped,
    NoDeployment,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognised instance status `{0}`")]
pub struct UnknownStatus(pub String);

impl InstanceStatus {
    pub const ALL: [InstanceStatus; 9] = [
        InstanceStatus::Running,
        InstanceStatus::NeedsSetup,
        InstanceStatus::Building,
        InstanceStatus::Deploying,
        InstanceStatus::Failed,
        InstanceStatus::Unhealthy,
        InstanceStatus::Stopped,
        InstanceStatus::NoDeployment,
        InstanceStatus::Unknown,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            InstanceStatus::Running => "running",
            InstanceStatus::NeedsSetup => "needs-setup",
            InstanceStatus::Building => "building",
            InstanceStatus::Deploying => "deploying",
            InstanceStatus::Failed => "failed",
            InstanceStatus::Unhealthy => "unhealthy",
            InstanceStatus::Stopped => "stopped",
            InstanceStatus::NoDeployment => "no-deployment",
            InstanceStatus::Unknown => "unknown",
        }
    }

    /// Dashboard label for the status badge.
    pub fn label(self) -> &'static str {
        match self {
            InstanceStatus::Running => "Running",
            InstanceStatus::NeedsSetup => "Needs Setup",
            InstanceStatus::Building => "Building",
            InstanceStatus::Deploying => "Deploying",
            InstanceStatus::Failed => "Failed",
            InstanceStatus::Unhealthy => "Unhealthy",
            InstanceStatus::Stopped => "Stopped",
            InstanceStatus::NoDeployment => "No Deployment",
            InstanceStatus::Unknown => "Unknown",
        }
    }

    /// Lenient read of a stored value; anything outside the closed set is `Unknown`.
    pub fn from_stored(raw: &str) -> Self {
        raw.parse().unwrap_or(InstanceStatus::Unknown)
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstanceStatus {
    type Err = UnknownStatus;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        InstanceStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == raw)
            .ok_or_else(|| UnknownStatus(raw.to_string()))
    }
}

/// Creation time as written by whichever client created the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
    Iso(String),
    EpochMillis(i64),
}

impl Timestamp {
    pub fn now() -> Self {
        Timestamp::Iso(now_iso())
    }

    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Timestamp::Iso(raw) => DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
            Timestamp::EpochMillis(ms) => DateTime::<Utc>::from_timestamp_millis(*ms),
        }
    }
}

impl From<&str> for Timestamp {
    fn from(raw: &str) -> Self {
        Timestamp::Iso(raw.to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TailscaleInfo {
    /// Private-network address of the instance.
    #[serde(default)]
    pub hostname: String,
    #[serde(flatten)]
    #[ts(skip)]
    pub extra: Map<String, Value>,
}

impl TailscaleInfo {
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            extra: Map::new(),
        }
    }
}

/// One fleet member as persisted in `fleet.json`.
///
/// `status` is kept as the raw stored string so values written by newer or
/// older clients survive a load/save cycle; use [`InstanceRecord::status`] for
/// the typed view. Keys this struct does not know about are kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct InstanceRecord {
    pub id: String,
    pub name: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub setup_password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub tailscale: Option<TailscaleInfo>,
    #[ts(type = "string | number")]
    pub created_at: Timestamp,
    #[serde(flatten)]
    #[ts(skip)]
    pub extra: Map<String, Value>,
}

impl InstanceRecord {
    /// Fresh record stamped with the current time.
    pub fn new(id: impl Into<String>, name: impl Into<String>, status: InstanceStatus) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status: status.as_str().to_string(),
            domain: None,
            setup_password: None,
            notes: None,
            tailscale: None,
            created_at: Timestamp::now(),
            extra: Map::new(),
        }
    }

    pub fn status(&self) -> InstanceStatus {
        InstanceStatus::from_stored(&self.status)
    }

    pub fn set_status(&mut self, status: InstanceStatus) {
        self.status = status.as_str().to_string();
    }
}

/// Reads a present JSON value (including `null`) as `Some(..)` so that an
/// explicit `null` clears a field while an absent key leaves it alone.
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Shallow partial update for an [`InstanceRecord`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct InstancePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub status: Option<InstanceStatus>,
    #[serde(
        default,
        deserialize_with = "nullable",
        skip_serializing_if = "Option::is_none"
    )]
    #[ts(optional)]
    pub domain: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "nullable",
        skip_serializing_if = "Option::is_none"
    )]
    #[ts(optional)]
    pub setup_password: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "nullable",
        skip_serializing_if = "Option::is_none"
    )]
    #[ts(optional)]
    pub notes: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "nullable",
        skip_serializing_if = "Option::is_none"
    )]
    #[ts(optional)]
    pub tailscale: Option<Option<TailscaleInfo>>,
    #[serde(flatten)]
    #[ts(skip)]
    pub extra: Map<String, Value>,
}

impl InstancePatch {
    pub fn status(status: InstanceStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(Some(domain.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.status.is_none()
            && self.domain.is_none()
            && self.setup_password.is_none()
            && self.notes.is_none()
            && self.tailscale.is_none()
            && self.extra.is_empty()
    }

    /// Overwrites every named field on `record`; unnamed fields are untouched
    /// and `tailscale` is replaced as a whole. `id` and `createdAt` are ignored.
    pub fn apply_to(self, record: &mut InstanceRecord) {
        if let Some(name) = self.name {
            record.name = name;
        }
        if let Some(status) = self.status {
            record.set_status(status);
        }
        if let Some(domain) = self.domain {
            record.domain = domain;
        }
        if let Some(setup_password) = self.setup_password {
            record.setup_password = setup_password;
        }
        if let Some(notes) = self.notes {
            record.notes = notes;
        }
        if let Some(tailscale) = self.tailscale {
            record.tailscale = tailscale;
        }
        for (key, value) in self.extra {
            if IMMUTABLE_KEYS.contains(&key.as_str()) {
                continue;
            }
            record.extra.insert(key, value);
        }
    }
}

/// Root document of the fleet store.
///
/// Records that no longer match [`InstanceRecord`] are kept verbatim in
/// `unreadable` and written back on save, so one off-shape entry never takes
/// the rest of the fleet down with it. They are invisible to the registry
/// until a `create` with the same id replaces them.
#[derive(Debug, Clone, PartialEq, TS)]
#[ts(export)]
pub struct FleetDocument {
    pub version: u32,
    pub instances: BTreeMap<String, InstanceRecord>,
    #[ts(skip)]
    pub unreadable: BTreeMap<String, Value>,
}

fn schema_version() -> u32 {
    FLEET_SCHEMA_VERSION
}

impl Default for FleetDocument {
    fn default() -> Self {
        Self {
            version: FLEET_SCHEMA_VERSION,
            instances: BTreeMap::new(),
            unreadable: BTreeMap::new(),
        }
    }
}

impl FleetDocument {
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// True when `id` is taken, by a readable record or an unreadable one.
    pub fn contains(&self, id: &str) -> bool {
        self.instances.contains_key(id) || self.unreadable.contains_key(id)
    }

    /// Store `record` under its id, replacing whatever held that id before.
    pub fn insert(&mut self, record: InstanceRecord) -> Option<InstanceRecord> {
        self.unreadable.remove(&record.id);
        self.instances.insert(record.id.clone(), record)
    }
}

#[derive(Deserialize)]
struct StoredDocument {
    #[serde(default = "schema_version")]
    version: u32,
    #[serde(default)]
    instances: BTreeMap<String, Value>,
}

impl From<StoredDocument> for FleetDocument {
    fn from(stored: StoredDocument) -> Self {
        let mut doc = FleetDocument {
            version: stored.version,
            ..FleetDocument::default()
        };
        for (id, raw) in stored.instances {
            match InstanceRecord::deserialize(&raw) {
                Ok(record) => {
                    doc.instances.insert(id, record);
                }
                Err(err) => {
                    warn!(
                        target: "fleetkeeper",
                        event = "fleet_store_record_unreadable",
                        id = %id,
                        error = %err
                    );
                    doc.unreadable.insert(id, raw);
                }
            }
        }
        doc
    }
}

impl<'de> Deserialize<'de> for FleetDocument {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        StoredDocument::deserialize(deserializer).map(FleetDocument::from)
    }
}

#[derive(Serialize)]
#[serde(untagged)]
enum StoredEntry<'a> {
    Record(&'a InstanceRecord),
    Raw(&'a Value),
}

impl Serialize for FleetDocument {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut entries: BTreeMap<&str, StoredEntry<'_>> = self
            .unreadable
            .iter()
            .map(|(id, raw)| (id.as_str(), StoredEntry::Raw(raw)))
            .collect();
        for (id, record) in &self.instances {
            entries.insert(id.as_str(), StoredEntry::Record(record));
        }

        let mut doc = serializer.serialize_struct("FleetDocument", 2)?;
        doc.serialize_field("version", &self.version)?;
        doc.serialize_field("instances", &entries)?;
        doc.end()
    }
}
