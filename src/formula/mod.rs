// src/formula/mod.rs

//! Formulas: TOML descriptions of work that expand into dependency graphs.
//!
//! - [`model`] is the serde data model.
//! - [`parser`] parses and validates formula content.
//! - [`cook`] substitutes `{{var}}` placeholders.
//! - [`molecule`] turns a cooked formula into beads and a [`crate::graph::Graph`].

pub mod cook;
pub mod model;
pub mod molecule;
pub mod parser;

pub use cook::cook;
pub use model::{CookedFormula, Formula, FormulaType, Leg, Step, Synthesis, VarDef};
pub use molecule::{generate_molecule, Molecule, MoleculeBead};
pub use parser::{
    extract_description_fast, extract_metadata_fast, extract_name_fast, formula_type,
    parse_batch, parse_formula, validate_batch, validate_formula, FormulaMetadata,
};
