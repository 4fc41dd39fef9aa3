// Domain models for work items and their constraints

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

// Helper functions for millisecond Duration serialization
fn serialize_millis<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_u64(duration.as_millis() as u64)
}

fn deserialize_millis<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let millis = u64::deserialize(deserializer)?;
    Ok(Duration::from_millis(millis))
}

fn serialize_opt_millis<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match duration {
        Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
        None => serializer.serialize_none(),
    }
}

fn deserialize_opt_millis<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let millis = Option::<u64>::deserialize(deserializer)?;
    Ok(millis.map(Duration::from_millis))
}

// ============================================================================
// Identity
// ============================================================================

/// Opaque identifier of a work item, stable for the item's lifetime
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkId(String);

impl WorkId {
    /// Generate a fresh random identifier
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for WorkId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WorkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for WorkId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<&str> for WorkId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for WorkId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<Uuid> for WorkId {
    fn from(id: Uuid) -> Self {
        Self(id.to_string())
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

/// WorkState is owned by the store and the execution engine.
/// Only `Enqueued` is actionable for a scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkState {
    #[default]
    Enqueued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
    Blocked,
}

impl WorkState {
    /// Terminal states: the item will never run again
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            WorkState::Succeeded | WorkState::Failed | WorkState::Cancelled
        )
    }
}

impl fmt::Display for WorkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkState::Enqueued => "enqueued",
            WorkState::Running => "running",
            WorkState::Succeeded => "succeeded",
            WorkState::Failed => "failed",
            WorkState::Cancelled => "cancelled",
            WorkState::Blocked => "blocked",
        };
        f.write_str(s)
    }
}

// ============================================================================
// Constraints
// ============================================================================

/// Kind of connectivity a work item needs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NetworkType {
    #[default]
    NotRequired,
    Connected,
    Unmetered,
    NotRoaming,
    Metered,
}

/// A content-observer trigger: the work runs when the content behind `uri` changes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentUriTrigger {
    pub uri: String,
    #[serde(default)]
    pub trigger_for_descendants: bool,
}

/// Constraints is the set of environmental conditions that must hold for an item to run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Constraints {
    #[serde(default)]
    pub required_network: NetworkType,
    #[serde(default)]
    pub requires_charging: bool,
    #[serde(default)]
    pub requires_device_idle: bool,
    #[serde(default)]
    pub requires_battery_not_low: bool,
    #[serde(default)]
    pub requires_storage_not_low: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content_uri_triggers: Vec<ContentUriTrigger>,
}

impl Constraints {
    /// No requirements at all
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_network(mut self, network: NetworkType) -> Self {
        self.required_network = network;
        self
    }

    pub fn with_charging(mut self) -> Self {
        self.requires_charging = true;
        self
    }

    pub fn with_device_idle(mut self) -> Self {
        self.requires_device_idle = true;
        self
    }

    pub fn with_battery_not_low(mut self) -> Self {
        self.requires_battery_not_low = true;
        self
    }

    pub fn with_storage_not_low(mut self) -> Self {
        self.requires_storage_not_low = true;
        self
    }

    pub fn with_content_uri_trigger(mut self, uri: impl Into<String>, descendants: bool) -> Self {
        self.content_uri_triggers.push(ContentUriTrigger {
            uri: uri.into(),
            trigger_for_descendants: descendants,
        });
        self
    }

    /// True when any requirement is set
    pub fn has_constraints(&self) -> bool {
        self.required_network != NetworkType::NotRequired
            || self.requires_charging
            || self.requires_device_idle
            || self.requires_battery_not_low
            || self.requires_storage_not_low
            || self.has_content_uri_triggers()
    }

    pub fn has_content_uri_triggers(&self) -> bool {
        !self.content_uri_triggers.is_empty()
    }
}

// ============================================================================
// Work Item
// ============================================================================

/// WorkItem describes one schedulable unit of deferred background work.
/// Produced and owned by the store; schedulers only read it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: WorkId,
    #[serde(default)]
    pub state: WorkState,
    #[serde(default)]
    pub constraints: Constraints,
    #[serde(
        default,
        rename = "interval_ms",
        serialize_with = "serialize_opt_millis",
        deserialize_with = "deserialize_opt_millis",
        skip_serializing_if = "Option::is_none"
    )]
    pub interval: Option<Duration>,
    #[serde(
        default,
        rename = "initial_delay_ms",
        serialize_with = "serialize_millis",
        deserialize_with = "deserialize_millis"
    )]
    pub initial_delay: Duration,
}

impl WorkItem {
    /// An enqueued, one-shot, undelayed item with no constraints
    pub fn new(id: impl Into<WorkId>) -> Self {
        Self {
            id: id.into(),
            state: WorkState::Enqueued,
            constraints: Constraints::none(),
            interval: None,
            initial_delay: Duration::ZERO,
        }
    }

    pub fn with_state(mut self, state: WorkState) -> Self {
        self.state = state;
        self
    }

    pub fn with_constraints(mut self, constraints: Constraints) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn is_periodic(&self) -> bool {
        self.interval.is_some()
    }

    pub fn has_constraints(&self) -> bool {
        self.constraints.has_constraints()
    }

    /// Enqueued, one-shot and due now: the only shape the greedy path acts on
    pub fn is_greedy_eligible(&self) -> bool {
        self.state == WorkState::Enqueued && !self.is_periodic() && self.initial_delay.is_zero()
    }
}
