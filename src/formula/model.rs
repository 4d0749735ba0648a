// src/formula/model.rs

//! TOML-backed formula data model.
//!
//! ```toml
//! name = "release"
//! type = "workflow"
//!
//! [vars.target]
//! default = "staging"
//!
//! [[steps]]
//! id = "build"
//! title = "Build for {{target}}"
//!
//! [[steps]]
//! id = "deploy"
//! title = "Deploy"
//! needs = ["build"]
//! duration = 15
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Kind of formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormulaType {
    /// Parallel legs followed by an optional synthesis.
    Convoy,
    /// Steps wired by `needs`.
    Workflow,
    Expansion,
    Aspect,
}

impl FormulaType {
    pub fn as_str(self) -> &'static str {
        match self {
            FormulaType::Convoy => "convoy",
            FormulaType::Workflow => "workflow",
            FormulaType::Expansion => "expansion",
            FormulaType::Aspect => "aspect",
        }
    }
}

impl fmt::Display for FormulaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FormulaType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "convoy" => Ok(FormulaType::Convoy),
            "workflow" => Ok(FormulaType::Workflow),
            "expansion" => Ok(FormulaType::Expansion),
            "aspect" => Ok(FormulaType::Aspect),
            other => Err(format!(
                "invalid formula type: {other} (expected convoy, workflow, expansion or aspect)"
            )),
        }
    }
}

/// `[[steps]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Step ids that must complete first.
    #[serde(default)]
    pub needs: Vec<String>,
    /// Estimated duration in minutes.
    #[serde(default)]
    pub duration: Option<u32>,
    /// Required capabilities.
    #[serde(default)]
    pub requires: Vec<String>,
}

/// `[[legs]]` entry of a convoy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leg {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub focus: String,
    #[serde(default)]
    pub description: String,
}

/// `[synthesis]` section of a convoy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Synthesis {
    #[serde(default = "default_synthesis_title")]
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Leg ids feeding the synthesis; empty means all legs.
    #[serde(default)]
    pub depends_on: Vec<String>,
}

fn default_synthesis_title() -> String {
    "Synthesis".to_string()
}

/// `[vars.<name>]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VarDef {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default)]
    pub required: bool,
}

/// A parsed (uncooked) formula.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Formula {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub formula_type: FormulaType,
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub legs: Vec<Leg>,
    #[serde(default)]
    pub synthesis: Option<Synthesis>,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default)]
    pub vars: BTreeMap<String, VarDef>,
}

fn default_version() -> u32 {
    1
}

/// A formula with its variables substituted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookedFormula {
    pub formula: Formula,
    /// Unix timestamp (seconds) of cooking.
    pub cooked_at: u64,
    /// Effective variable values used for substitution.
    pub cooked_vars: BTreeMap<String, String>,
    pub original_name: String,
}
