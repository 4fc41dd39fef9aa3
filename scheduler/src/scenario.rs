// Scenario files replayed by the scheduler binary

use serde::{Deserialize, Serialize};
use std::path::Path;
use workgate::constraints::DeviceState;
use workgate::errors::ScenarioError;
use workgate::models::{WorkId, WorkItem};

/// Longest single pause a scenario may request
const MAX_SLEEP_MS: u64 = 60_000;

/// A scripted run: an initial device reading and an ordered list of steps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub device: DeviceState,
    pub steps: Vec<Step>,
}

/// One scripted action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// Hand a batch to every registered scheduler
    Schedule { items: Vec<WorkItem> },
    /// Publish a new device reading to the constraint tracker
    Device { state: DeviceState },
    /// Cancel one item on every registered scheduler
    Cancel { id: WorkId },
    /// Drop tracked items that are no longer in the store
    Prune { live: Vec<WorkId> },
    Sleep { ms: u64 },
}

impl Scenario {
    /// Read and validate a scenario file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| ScenarioError::ReadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self, ScenarioError> {
        let scenario: Scenario = serde_json::from_str(raw)?;
        scenario.validate()?;
        Ok(scenario)
    }

    fn validate(&self) -> Result<(), ScenarioError> {
        if self.steps.is_empty() {
            return Err(ScenarioError::InvalidScenario(
                "scenario has no steps".to_string(),
            ));
        }

        for (index, step) in self.steps.iter().enumerate() {
            let ids: Vec<&WorkId> = match step {
                Step::Schedule { items } => items.iter().map(|item| &item.id).collect(),
                Step::Cancel { id } => vec![id],
                Step::Prune { live } => live.iter().collect(),
                Step::Device { .. } => Vec::new(),
                Step::Sleep { ms } => {
                    if *ms > MAX_SLEEP_MS {
                        return Err(ScenarioError::InvalidScenario(format!(
                            "step {}: sleep of {}ms exceeds {}ms",
                            index, ms, MAX_SLEEP_MS
                        )));
                    }
                    Vec::new()
                }
            };
            if ids.iter().any(|id| id.as_str().trim().is_empty()) {
                return Err(ScenarioError::InvalidScenario(format!(
                    "step {}: work id must not be empty",
                    index
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use workgate::models::NetworkType;

    const SAMPLE: &str = r#"{
        "device": { "network": { "connected": false } },
        "steps": [
            { "action": "schedule", "items": [
                { "id": "a" },
                { "id": "b", "constraints": { "required_network": "connected" } }
            ] },
            { "action": "device", "state": { "network": { "connected": true } } },
            { "action": "sleep", "ms": 100 },
            { "action": "cancel", "id": "b" },
            { "action": "prune", "live": ["a"] }
        ]
    }"#;

    #[test]
    fn test_parse_sample_scenario() {
        let scenario = Scenario::parse(SAMPLE).unwrap();

        assert!(!scenario.device.network.connected);
        assert_eq!(scenario.steps.len(), 5);
        match &scenario.steps[0] {
            Step::Schedule { items } => {
                assert_eq!(items[0], WorkItem::new("a"));
                assert_eq!(items[1].constraints.required_network, NetworkType::Connected);
            }
            other => panic!("unexpected step: {:?}", other),
        }
        assert_eq!(
            scenario.steps[3],
            Step::Cancel {
                id: WorkId::from("b")
            }
        );
    }

    #[test]
    fn test_empty_scenario_rejected() {
        let err = Scenario::parse(r#"{ "steps": [] }"#).unwrap_err();
        assert!(matches!(err, ScenarioError::InvalidScenario(_)));
    }

    #[test]
    fn test_empty_id_rejected() {
        let err = Scenario::parse(r#"{ "steps": [ { "action": "cancel", "id": " " } ] }"#)
            .unwrap_err();
        assert!(err.to_string().contains("step 0"));
    }

    #[test]
    fn test_long_sleep_rejected() {
        let err = Scenario::parse(r#"{ "steps": [ { "action": "sleep", "ms": 3600000 } ] }"#)
            .unwrap_err();
        assert!(matches!(err, ScenarioError::InvalidScenario(_)));
    }

    #[test]
    fn test_unknown_action_rejected() {
        let err = Scenario::parse(r#"{ "steps": [ { "action": "reboot" } ] }"#).unwrap_err();
        assert!(matches!(err, ScenarioError::InvalidScenario(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let scenario = Scenario::load(file.path()).unwrap();
        assert_eq!(scenario.steps.len(), 5);
    }

    #[test]
    fn test_load_missing_file() {
        let err = Scenario::load("/nonexistent/scenario.json").unwrap_err();
        assert!(matches!(err, ScenarioError::ReadFailed { .. }));
    }
}
