//! Project documents: an ethogram plus coded observations.

use std::path::Path;

use anyhow::{Context, Result};
use bt_core::{AnalysisContext, Ethogram, FailurePolicy, Observation};
use serde::{Deserialize, Serialize};

/// On-disk project, as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub ethogram: Ethogram,
    #[serde(default)]
    pub observations: Vec<Observation>,
}

impl Project {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let project: Self = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse project {}", path.display()))?;
        tracing::debug!(
            path = %path.display(),
            behaviors = project.ethogram.len(),
            observations = project.observations.len(),
            "loaded project"
        );
        Ok(project)
    }

    /// Hand the project over to a fresh analysis context.
    pub fn into_context(self, policy: FailurePolicy) -> AnalysisContext {
        AnalysisContext::new(self.ethogram, self.observations).with_policy(policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bt_core::{BehaviorCode, BehaviorType, ObservationKind};

    const SAMPLE: &str = r#"{
        "ethogram": [
            {"code": "rest", "type": "state"},
            {"code": "bite", "type": "POINT"}
        ],
        "observations": [
            {
                "id": "o1",
                "kind": "LIVE",
                "events": [
                    {"time": "0.0", "behavior": "rest"},
                    {"time": 1.5, "subject": "A", "behavior": "bite", "modifiers": "left"},
                    {"time": "5.0", "behavior": "rest", "comment": "wakes"}
                ]
            }
        ]
    }"#;

    #[test]
    fn loads_project_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("project.json");
        std::fs::write(&path, SAMPLE).unwrap();

        let project = Project::load(&path).unwrap();
        assert_eq!(project.ethogram.len(), 2);
        assert_eq!(
            project.ethogram.behavior_type(&BehaviorCode::new("bite").unwrap()),
            Some(BehaviorType::Point)
        );
        let obs = &project.observations[0];
        assert_eq!(obs.kind, ObservationKind::Live);
        assert_eq!(obs.events.len(), 3);
        assert_eq!(obs.events[1].modifiers, "left");
        assert!(obs.events[0].subject.as_str().is_empty());
    }

    #[test]
    fn reports_missing_file() {
        let err = Project::load(Path::new("/nonexistent/project.json")).unwrap_err();
        assert!(err.to_string().contains("failed to read"));
    }
}
