// src/formula/molecule.rs

//! Molecules: the bead chain generated from a cooked formula.
//!
//! - Workflow steps become beads wired by their `needs`.
//! - Convoy legs become beads chained sequentially (leg `i` waits for
//!   leg `i - 1`), followed by a synthesis bead if one is declared.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{BeadflowError, Result};
use crate::formula::model::{CookedFormula, FormulaType};
use crate::graph::order::kahn_indices;
use crate::graph::{Graph, NodeSpec};

pub const SYNTHESIS_ID: &str = "synthesis";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoleculeBead {
    pub id: String,
    pub title: String,
    pub description: String,
    pub labels: Vec<String>,
    /// Indices of beads that must complete first.
    pub depends_on: Vec<usize>,
    /// Estimated duration in minutes.
    pub duration: Option<u32>,
    pub requires: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Molecule {
    pub formula_name: String,
    pub formula_type: FormulaType,
    pub beads: Vec<MoleculeBead>,
    pub has_cycle: bool,
    /// Bead indices in execution order (partial when `has_cycle`).
    pub execution_order: Vec<usize>,
}

impl Molecule {
    /// Graph view of the molecule; durations become node weights.
    pub fn to_graph(&self) -> Result<Graph> {
        let specs = self
            .beads
            .iter()
            .map(|bead| NodeSpec {
                title: bead.title.clone(),
                weight: bead.duration.map(f64::from),
                needs: bead
                    .depends_on
                    .iter()
                    .filter_map(|&i| self.beads.get(i).map(|b| b.id.clone()))
                    .collect(),
                ..NodeSpec::new(bead.id.clone())
            })
            .collect();
        Graph::from_specs(specs)
    }
}

pub fn generate_molecule(cooked: &CookedFormula) -> Result<Molecule> {
    let formula = &cooked.formula;
    let mut beads: Vec<MoleculeBead> = Vec::new();

    for step in &formula.steps {
        beads.push(MoleculeBead {
            id: step.id.clone(),
            title: step.title.clone(),
            description: step.description.clone(),
            labels: vec!["molecule".to_string(), formula.name.clone()],
            depends_on: Vec::new(),
            duration: step.duration,
            requires: step.requires.clone(),
        });
    }
    for (i, step) in formula.steps.iter().enumerate() {
        let mut deps = Vec::with_capacity(step.needs.len());
        for need in &step.needs {
            let idx = position(&beads, need).ok_or_else(|| {
                BeadflowError::Formula(format!("step '{}' needs unknown step '{}'", step.id, need))
            })?;
            deps.push(idx);
        }
        beads[i].depends_on = deps;
    }

    let first_leg = beads.len();
    for (i, leg) in formula.legs.iter().enumerate() {
        beads.push(MoleculeBead {
            id: leg.id.clone(),
            title: leg.title.clone(),
            description: leg.description.clone(),
            labels: vec![
                "molecule".to_string(),
                "convoy".to_string(),
                formula.name.clone(),
            ],
            depends_on: if i > 0 { vec![first_leg + i - 1] } else { Vec::new() },
            duration: None,
            requires: Vec::new(),
        });
    }

    if let Some(synthesis) = &formula.synthesis {
        let depends_on: Vec<usize> = if synthesis.depends_on.is_empty() {
            (first_leg..beads.len()).collect()
        } else {
            synthesis
                .depends_on
                .iter()
                .filter_map(|leg| position(&beads, leg))
                .collect()
        };
        beads.push(MoleculeBead {
            id: SYNTHESIS_ID.to_string(),
            title: synthesis.title.clone(),
            description: synthesis.description.clone(),
            labels: vec!["molecule".to_string(), "synthesis".to_string(), formula.name.clone()],
            depends_on,
            duration: None,
            requires: Vec::new(),
        });
    }

    let mut molecule = Molecule {
        formula_name: formula.name.clone(),
        formula_type: formula.formula_type,
        beads,
        has_cycle: false,
        execution_order: Vec::new(),
    };

    let graph = molecule.to_graph()?;
    molecule.execution_order = kahn_indices(&graph);
    molecule.has_cycle = molecule.execution_order.len() != molecule.beads.len();

    debug!(
        formula = %molecule.formula_name,
        beads = molecule.beads.len(),
        has_cycle = molecule.has_cycle,
        "generated molecule"
    );
    Ok(molecule)
}

fn position(beads: &[MoleculeBead], id: &str) -> Option<usize> {
    beads.iter().position(|b| b.id == id)
}
