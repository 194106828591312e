// src/dataset.rs
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;
use tracing::info;

use crate::models::{Agent, HolidayException, JourFerie, Pointage, Prime};

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("Failed to read dataset file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse dataset JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Duplicate agent id in dataset: {0}")]
    DuplicateAgent(String),
    #[error("{kind} {id} references unknown agent {agent_id}")]
    UnknownAgent {
        kind: &'static str,
        id: String,
        agent_id: String,
    },
    #[error("Exception {id} references unknown holiday {jour_ferie_id}")]
    UnknownHoliday { id: String, jour_ferie_id: String },
}

/// Snapshot of everything the engine reads: agents with their pay
/// parameters, raw scans, the holiday calendar and primes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub agents: Vec<Agent>,
    #[serde(default)]
    pub pointages: Vec<Pointage>,
    #[serde(default)]
    pub jours_feries: Vec<JourFerie>,
    #[serde(default)]
    pub exceptions: Vec<HolidayException>,
    #[serde(default)]
    pub primes: Vec<Prime>,
}

impl Dataset {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, DatasetError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let dataset = Self::from_json(&raw)?;
        info!(
            "Loaded dataset {}: {} agents, {} pointages, {} holidays, {} exceptions, {} primes",
            path.display(),
            dataset.agents.len(),
            dataset.pointages.len(),
            dataset.jours_feries.len(),
            dataset.exceptions.len(),
            dataset.primes.len()
        );
        Ok(dataset)
    }

    pub fn from_json(raw: &str) -> Result<Self, DatasetError> {
        let dataset: Dataset = serde_json::from_str(raw)?;
        dataset.validate()?;
        Ok(dataset)
    }

    /// Referential checks only; scan anomalies are the aggregator's business.
    pub fn validate(&self) -> Result<(), DatasetError> {
        let mut agent_ids = HashSet::new();
        for agent in &self.agents {
            if !agent_ids.insert(agent.id.as_str()) {
                return Err(DatasetError::DuplicateAgent(agent.id.clone()));
            }
        }
        let unknown = |kind: &'static str, id: &str, agent_id: &str| DatasetError::UnknownAgent {
            kind,
            id: id.to_string(),
            agent_id: agent_id.to_string(),
        };
        for p in &self.pointages {
            if !agent_ids.contains(p.agent_id.as_str()) {
                return Err(unknown("Pointage", &p.id, &p.agent_id));
            }
        }
        for p in &self.primes {
            if !agent_ids.contains(p.agent_id.as_str()) {
                return Err(unknown("Prime", &p.id, &p.agent_id));
            }
        }
        let holiday_ids: HashSet<&str> = self.jours_feries.iter().map(|h| h.id.as_str()).collect();
        for ex in &self.exceptions {
            if !agent_ids.contains(ex.agent_id.as_str()) {
                return Err(unknown("Exception", &ex.id, &ex.agent_id));
            }
            if !holiday_ids.contains(ex.jour_ferie_id.as_str()) {
                return Err(DatasetError::UnknownHoliday {
                    id: ex.id.clone(),
                    jour_ferie_id: ex.jour_ferie_id.clone(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "agents": [
            {"id": "A1", "nom": "Amine", "email": "amine@example.dz", "role": "agent",
             "paie": {"taux_horaire": "500", "retenues_fixes": "1000"}},
            {"id": "A2", "nom": "Sara", "email": "sara@example.dz", "role": "superviseur"}
        ],
        "pointages": [
            {"id": "p1", "agent_id": "A1", "date": "2025-03-03", "heure": "08:00:00",
             "type": "arrivee", "session": "matin"}
        ],
        "jours_feries": [
            {"id": "jf1", "date": "2025-05-01", "nom": "Fête du Travail", "type": "legal", "recurrent": true}
        ],
        "exceptions": [
            {"id": "ex1", "jour_ferie_id": "jf1", "agent_id": "A1"}
        ],
        "primes": [
            {"id": "pr1", "agent_id": "A2", "montant": "1500", "motif": "Rendement", "mois": 3, "annee": 2025}
        ]
    }"#;

    #[test]
    fn parses_and_validates_sample() {
        let dataset = Dataset::from_json(SAMPLE).unwrap();
        assert_eq!(dataset.agents.len(), 2);
        assert!(dataset.agents[1].paie.taux_horaire.is_none());
        assert!(!dataset.pointages[0].annule);
        assert_eq!(dataset.exceptions[0].jour_ferie_id, "jf1");
    }

    #[test]
    fn rejects_dangling_references() {
        let mut dataset = Dataset::from_json(SAMPLE).unwrap();
        dataset.pointages[0].agent_id = "ghost".to_string();
        assert!(matches!(dataset.validate(), Err(DatasetError::UnknownAgent { kind: "Pointage", .. })));

        let mut dataset = Dataset::from_json(SAMPLE).unwrap();
        dataset.exceptions[0].jour_ferie_id = "nope".to_string();
        assert!(matches!(dataset.validate(), Err(DatasetError::UnknownHoliday { .. })));

        let mut dataset = Dataset::from_json(SAMPLE).unwrap();
        let dup = dataset.agents[0].clone();
        dataset.agents.push(dup);
        assert!(matches!(dataset.validate(), Err(DatasetError::DuplicateAgent(id)) if id == "A1"));
    }

    #[test]
    fn bundled_sample_dataset_loads() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/data/sample_dataset.json");
        let dataset = Dataset::from_path(path).unwrap();
        assert_eq!(dataset.agents.len(), 3);
        assert_eq!(dataset.pointages.len(), 7);
    }

    #[test]
    fn malformed_json_is_reported() {
        assert!(matches!(Dataset::from_json("{"), Err(DatasetError::Json(_))));
    }
}
