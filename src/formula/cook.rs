// src/formula/cook.rs

//! Variable substitution ("cooking").
//!
//! Placeholders look like `{{name}}`. Values come from the caller first,
//! then from the variable's `default`. A `required` variable without a value
//! is an error; placeholders naming unknown variables are left untouched.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use regex::{Captures, Regex};
use tracing::{debug, warn};

use crate::errors::{BeadflowError, Result};
use crate::formula::model::{CookedFormula, Formula};

const PLACEHOLDER: &str = r"\{\{\s*([A-Za-z_][A-Za-z0-9_\-]*)\s*\}\}";

pub fn cook(formula: &Formula, vars: &BTreeMap<String, String>) -> Result<CookedFormula> {
    let cooked_vars = resolve_vars(formula, vars)?;
    let pattern = Regex::new(PLACEHOLDER)
        .map_err(|e| BeadflowError::Formula(format!("invalid placeholder pattern: {e}")))?;

    let subst = |text: &str| -> String {
        pattern
            .replace_all(text, |caps: &Captures<'_>| match cooked_vars.get(&caps[1]) {
                Some(value) => value.clone(),
                None => caps[0].to_string(),
            })
            .into_owned()
    };

    let mut out = formula.clone();
    out.name = subst(&formula.name);
    out.description = subst(&formula.description);
    for step in &mut out.steps {
        step.title = subst(&step.title);
        step.description = subst(&step.description);
    }
    for leg in &mut out.legs {
        leg.title = subst(&leg.title);
        leg.focus = subst(&leg.focus);
        leg.description = subst(&leg.description);
    }
    if let Some(synthesis) = &mut out.synthesis {
        synthesis.title = subst(&synthesis.title);
        synthesis.description = subst(&synthesis.description);
    }

    let cooked_at = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    debug!(formula = %formula.name, vars = cooked_vars.len(), "cooked formula");

    Ok(CookedFormula {
        formula: out,
        cooked_at,
        cooked_vars,
        original_name: formula.name.clone(),
    })
}

fn resolve_vars(
    formula: &Formula,
    provided: &BTreeMap<String, String>,
) -> Result<BTreeMap<String, String>> {
    let mut resolved = BTreeMap::new();

    for (name, def) in &formula.vars {
        match provided.get(name).or(def.default.as_ref()) {
            Some(value) => {
                resolved.insert(name.clone(), value.clone());
            }
            None if def.required => {
                return Err(BeadflowError::Formula(format!(
                    "formula '{}' requires variable '{}'",
                    formula.name, name
                )));
            }
            None => {}
        }
    }

    for (name, value) in provided {
        if !formula.vars.contains_key(name) {
            warn!(formula = %formula.name, var = %name, "variable not declared by formula");
            resolved.insert(name.clone(), value.clone());
        }
    }

    Ok(resolved)
}
