// tests/formula.rs

use std::collections::BTreeMap;
use std::error::Error;

use beadflow::errors::BeadflowError;
use beadflow::formula::{
    FormulaMetadata, FormulaType, cook, extract_description_fast, extract_metadata_fast,
    extract_name_fast, formula_type, generate_molecule, parse_batch, parse_formula,
    validate_batch, validate_formula,
};
use beadflow::graph::{critical_path, topological_sort};

type TestResult = Result<(), Box<dyn Error>>;

const WORKFLOW: &str = r#"
name = "deploy-{{env}}"
description = "Ship to {{env}}"
type = "workflow"

[vars.env]
description = "target environment"
default = "staging"

[vars.owner]
required = true

[[steps]]
id = "build"
title = "Build for {{env}}"
duration = 10

[[steps]]
id = "test"
title = "Test"
needs = ["build"]
duration = 5

[[steps]]
id = "deploy"
title = "Deploy {{env}} as {{owner}}"
needs = ["build", "test"]
duration = 3
requires = ["prod-access"]
"#;

const CONVOY: &str = r#"
# review convoy
type = "convoy"
name = "review"

[[legs]]
id = "security"
title = "Security pass"
focus = "auth"

[[legs]]
id = "perf"
title = "Performance pass"

[[legs]]
id = "docs"
title = "Docs pass"

[synthesis]
description = "Merge findings"
"#;

fn owner(value: &str) -> BTreeMap<String, String> {
    BTreeMap::from([("owner".to_string(), value.to_string())])
}

#[test]
fn parses_workflow_formula() -> TestResult {
    let formula = parse_formula(WORKFLOW)?;
    assert_eq!(formula.formula_type, FormulaType::Workflow);
    assert_eq!(formula.version, 1);
    assert_eq!(formula.steps.len(), 3);
    assert_eq!(formula.steps[2].needs, vec!["build", "test"]);
    assert_eq!(formula.steps[2].requires, vec!["prod-access"]);
    assert!(formula.vars["owner"].required);
    assert_eq!(formula.vars["env"].default.as_deref(), Some("staging"));
    Ok(())
}

#[test]
fn type_is_read_without_a_full_parse() -> TestResult {
    assert_eq!(formula_type(CONVOY)?, FormulaType::Convoy);
    assert_eq!(formula_type(WORKFLOW)?, FormulaType::Workflow);
    assert_eq!("  Aspect ".parse::<FormulaType>(), Ok(FormulaType::Aspect));
    assert!("nonsense".parse::<FormulaType>().is_err());
    assert_eq!(FormulaType::Expansion.to_string(), "expansion");
    Ok(())
}

#[test]
fn invalid_formulas_are_rejected() {
    assert!(matches!(parse_formula("   "), Err(BeadflowError::Formula(_))));
    assert!(matches!(
        parse_formula("name = \"x\"\ntype = \"bogus\""),
        Err(BeadflowError::Toml(_))
    ));

    let dangling = r#"
name = "x"
type = "workflow"
[[steps]]
id = "a"
title = "A"
needs = ["ghost"]
"#;
    match parse_formula(dangling) {
        Err(BeadflowError::Formula(msg)) => assert!(msg.contains("unknown step 'ghost'")),
        other => panic!("expected formula error, got {other:?}"),
    }

    let duplicate = r#"
name = "x"
type = "workflow"
[[steps]]
id = "a"
title = "A"
[[steps]]
id = "a"
title = "A again"
"#;
    assert!(!validate_formula(duplicate));
    assert!(validate_formula(CONVOY));

    let bad_synthesis = r#"
name = "x"
type = "convoy"
[[legs]]
id = "one"
title = "One"
[synthesis]
depends_on = ["two"]
"#;
    assert!(parse_formula(bad_synthesis).is_err());
}

#[test]
fn batch_parse_stops_at_first_error() {
    assert_eq!(parse_batch(&[WORKFLOW, CONVOY]).map(|f| f.len()).ok(), Some(2));
    assert!(parse_batch(&[WORKFLOW, ""]).is_err());
}

#[test]
fn batch_validation_reports_every_input() {
    assert_eq!(
        validate_batch(&[WORKFLOW, "", CONVOY, "name = \"x\"\ntype = \"bogus\""]),
        vec![true, false, true, false]
    );
    assert!(validate_batch(&[]).is_empty());
}

#[test]
fn metadata_is_read_from_top_level_lines() -> TestResult {
    assert_eq!(extract_name_fast(WORKFLOW), Some("deploy-{{env}}"));
    assert_eq!(extract_description_fast(WORKFLOW), Some("Ship to {{env}}"));
    assert_eq!(extract_name_fast(CONVOY), Some("review"));
    // The convoy only has descriptions inside tables.
    assert_eq!(extract_description_fast(CONVOY), None);

    assert_eq!(
        extract_metadata_fast(WORKFLOW),
        FormulaMetadata {
            name: Some("deploy-{{env}}"),
            description: Some("Ship to {{env}}"),
            formula_type: Some(FormulaType::Workflow),
            version: None,
        }
    );

    let versioned = "# header\nversion = 2\ntype = \"aspect\"\nname = \"audit\"\n";
    let metadata = extract_metadata_fast(versioned);
    assert_eq!(metadata.version, Some(2));
    assert_eq!(metadata.formula_type, Some(FormulaType::Aspect));
    assert_eq!(metadata.name, Some("audit"));
    assert_eq!(metadata.description, None);

    let json = serde_json::to_value(&metadata)?;
    assert_eq!(json["type"], "aspect");
    assert_eq!(json["name"], "audit");
    Ok(())
}

#[test]
fn metadata_scan_does_not_validate() {
    // Broken past the header, but the top-level lines are still readable.
    let broken = "name = \"half\"\ntype = \"workflow\"\n[[steps]]\nid = ";
    assert!(!validate_formula(broken));
    assert_eq!(extract_name_fast(broken), Some("half"));
    assert_eq!(extract_metadata_fast(broken).formula_type, Some(FormulaType::Workflow));

    let unquoted = "name = 42\ntype = \"nonsense\"";
    assert_eq!(extract_metadata_fast(unquoted), FormulaMetadata::default());
    assert_eq!(extract_name_fast(""), None);
}

#[test]
fn cooking_substitutes_variables() -> TestResult {
    let formula = parse_formula(WORKFLOW)?;
    let mut vars = owner("ops");
    vars.insert("env".to_string(), "prod".to_string());

    let cooked = cook(&formula, &vars)?;
    assert_eq!(cooked.formula.name, "deploy-prod");
    assert_eq!(cooked.formula.description, "Ship to prod");
    assert_eq!(cooked.formula.steps[0].title, "Build for prod");
    assert_eq!(cooked.formula.steps[2].title, "Deploy prod as ops");
    assert_eq!(cooked.original_name, "deploy-{{env}}");
    assert_eq!(cooked.cooked_vars.len(), 2);
    assert!(cooked.cooked_at > 0);
    Ok(())
}

#[test]
fn defaults_fill_missing_variables() -> TestResult {
    let cooked = cook(&parse_formula(WORKFLOW)?, &owner("me"))?;
    assert_eq!(cooked.formula.name, "deploy-staging");
    assert_eq!(cooked.cooked_vars["env"], "staging");
    Ok(())
}

#[test]
fn missing_required_variable_is_an_error() -> TestResult {
    let formula = parse_formula(WORKFLOW)?;
    match cook(&formula, &BTreeMap::new()) {
        Err(BeadflowError::Formula(msg)) => assert!(msg.contains("owner"), "{msg}"),
        other => panic!("expected formula error, got {other:?}"),
    }
    Ok(())
}

#[test]
fn unknown_placeholders_are_left_alone() -> TestResult {
    let content = r#"
name = "n"
type = "workflow"
[[steps]]
id = "a"
title = "Hello {{ who }} and {{nobody}}"
"#;
    let vars = BTreeMap::from([("who".to_string(), "world".to_string())]);
    let cooked = cook(&parse_formula(content)?, &vars)?;
    assert_eq!(cooked.formula.steps[0].title, "Hello world and {{nobody}}");
    // Undeclared but provided variables are still recorded.
    assert_eq!(cooked.cooked_vars["who"], "world");
    Ok(())
}

#[test]
fn workflow_molecule_follows_step_needs() -> TestResult {
    let cooked = cook(&parse_formula(WORKFLOW)?, &owner("ops"))?;
    let molecule = generate_molecule(&cooked)?;

    assert_eq!(molecule.formula_name, "deploy-staging");
    assert_eq!(molecule.beads.len(), 3);
    assert_eq!(molecule.beads[1].depends_on, vec![0]);
    assert_eq!(molecule.beads[2].depends_on, vec![0, 1]);
    assert!(molecule.beads[0].labels.contains(&"molecule".to_string()));
    assert!(!molecule.has_cycle);
    assert_eq!(molecule.execution_order, vec![0, 1, 2]);

    // The molecule doubles as a weighted dependency graph.
    let graph = molecule.to_graph()?;
    assert_eq!(topological_sort(&graph)?, vec!["build", "test", "deploy"]);
    let cp = critical_path(&graph);
    assert_eq!(cp.total_duration, 18.0);
    assert_eq!(cp.chain, vec!["build", "test", "deploy"]);
    Ok(())
}

#[test]
fn convoy_molecule_chains_legs_into_synthesis() -> TestResult {
    let cooked = cook(&parse_formula(CONVOY)?, &BTreeMap::new())?;
    let molecule = generate_molecule(&cooked)?;

    let ids: Vec<&str> = molecule.beads.iter().map(|b| b.id.as_str()).collect();
    assert_eq!(ids, vec!["security", "perf", "docs", "synthesis"]);
    assert!(molecule.beads[0].depends_on.is_empty());
    assert_eq!(molecule.beads[1].depends_on, vec![0]);
    assert_eq!(molecule.beads[2].depends_on, vec![1]);

    let synthesis = &molecule.beads[3];
    assert_eq!(synthesis.title, "Synthesis");
    assert_eq!(synthesis.depends_on, vec![0, 1, 2]);
    assert!(synthesis.labels.contains(&"synthesis".to_string()));
    assert_eq!(molecule.execution_order, vec![0, 1, 2, 3]);
    Ok(())
}

#[test]
fn molecule_serializes_for_the_cli() -> TestResult {
    let cooked = cook(&parse_formula(CONVOY)?, &BTreeMap::new())?;
    let molecule = generate_molecule(&cooked)?;
    let json = serde_json::to_value(&molecule)?;
    assert_eq!(json["formula_type"], "convoy");
    assert_eq!(json["beads"].as_array().map(Vec::len), Some(4));
    Ok(())
}
