// src/formula/parser.rs

//! Formula parsing and validation.

use std::collections::HashSet;

use serde::Serialize;
use tracing::debug;

use crate::errors::{BeadflowError, Result};
use crate::formula::model::{Formula, FormulaType};

/// Parse TOML formula content and check its internal references.
pub fn parse_formula(content: &str) -> Result<Formula> {
    if content.trim().is_empty() {
        return Err(BeadflowError::Formula("empty formula content".to_string()));
    }

    let formula: Formula = toml::from_str(content)?;
    validate_structure(&formula)?;

    debug!(
        formula = %formula.name,
        formula_type = %formula.formula_type,
        steps = formula.steps.len(),
        legs = formula.legs.len(),
        "parsed formula"
    );
    Ok(formula)
}

/// `true` if `content` parses into a structurally valid formula.
pub fn validate_formula(content: &str) -> bool {
    parse_formula(content).is_ok()
}

/// Formula type, read from a top-level `type = "..."` line when possible,
/// falling back to a full parse.
pub fn formula_type(content: &str) -> Result<FormulaType> {
    if let Some(found) = top_level_string(content, "type").and_then(|v| v.parse().ok()) {
        return Ok(found);
    }
    Ok(parse_formula(content)?.formula_type)
}

pub fn parse_batch(contents: &[&str]) -> Result<Vec<Formula>> {
    contents.iter().map(|c| parse_formula(c)).collect()
}

/// One flag per input, in input order. Never stops early.
pub fn validate_batch(contents: &[&str]) -> Vec<bool> {
    contents.iter().map(|c| validate_formula(c)).collect()
}

/// Top-level fields read by a line scan, without building a [`Formula`].
///
/// Only `key = "value"` lines before the first table header count, so a
/// step's `description` never shadows the formula's. Nothing is validated:
/// a `None` means the line was missing or not a plain quoted string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FormulaMetadata<'a> {
    pub name: Option<&'a str>,
    pub description: Option<&'a str>,
    #[serde(rename = "type")]
    pub formula_type: Option<FormulaType>,
    pub version: Option<u32>,
}

pub fn extract_name_fast(content: &str) -> Option<&str> {
    top_level_string(content, "name")
}

pub fn extract_description_fast(content: &str) -> Option<&str> {
    top_level_string(content, "description")
}

pub fn extract_metadata_fast(content: &str) -> FormulaMetadata<'_> {
    let mut metadata = FormulaMetadata::default();
    for (key, value) in top_level_pairs(content) {
        match key {
            "name" if metadata.name.is_none() => metadata.name = quoted(value),
            "description" if metadata.description.is_none() => {
                metadata.description = quoted(value)
            }
            "type" if metadata.formula_type.is_none() => {
                metadata.formula_type = quoted(value).and_then(|v| v.parse().ok())
            }
            "version" if metadata.version.is_none() => metadata.version = value.parse().ok(),
            _ => {}
        }
    }
    metadata
}

/// `key = value` pairs ahead of the first table header, comments skipped.
fn top_level_pairs(content: &str) -> impl Iterator<Item = (&str, &str)> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .take_while(|line| !line.starts_with('['))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim(), value.trim()))
}

fn top_level_string<'a>(content: &'a str, wanted: &str) -> Option<&'a str> {
    top_level_pairs(content)
        .find(|(key, _)| *key == wanted)
        .and_then(|(_, value)| quoted(value))
}

/// Contents of a `"..."` value; escapes are not interpreted.
fn quoted(value: &str) -> Option<&str> {
    let rest = value.strip_prefix('"')?;
    let end = rest.find('"')?;
    Some(&rest[..end])
}

fn validate_structure(formula: &Formula) -> Result<()> {
    if formula.name.trim().is_empty() {
        return Err(BeadflowError::Formula("formula name must not be empty".to_string()));
    }

    let mut step_ids = HashSet::new();
    for step in &formula.steps {
        if !step_ids.insert(step.id.as_str()) {
            return Err(BeadflowError::Formula(format!(
                "formula '{}' has duplicate step id '{}'",
                formula.name, step.id
            )));
        }
    }
    for step in &formula.steps {
        for need in &step.needs {
            if !step_ids.contains(need.as_str()) {
                return Err(BeadflowError::Formula(format!(
                    "step '{}' needs unknown step '{}'",
                    step.id, need
                )));
            }
        }
    }

    let mut leg_ids = HashSet::new();
    for leg in &formula.legs {
        if !leg_ids.insert(leg.id.as_str()) || step_ids.contains(leg.id.as_str()) {
            return Err(BeadflowError::Formula(format!(
                "formula '{}' has duplicate id '{}'",
                formula.name, leg.id
            )));
        }
    }
    if let Some(synthesis) = &formula.synthesis {
        for dep in &synthesis.depends_on {
            if !leg_ids.contains(dep.as_str()) {
                return Err(BeadflowError::Formula(format!(
                    "synthesis depends on unknown leg '{dep}'"
                )));
            }
        }
    }

    Ok(())
}
