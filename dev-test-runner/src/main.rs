//! Runs every `fixtures/*.json` case in both directions.
//!
//! A case is `{ "schema": Schema, "wire": <value>, "flat": <flat store> }`.
//! Flattening `wire` must write exactly `flat` (same entries, same order) and
//! resolving `flat` must give back `wire`. An optional first argument is a
//! regex that selects cases by file name.
use std::path::PathBuf;
use std::process::ExitCode;

use flatmap_bridge::path_de::from_str_with_path;
use flatmap_bridge::{flatten_value, resolve_value, FlatMap, Schema};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

static FIXTURE_DIR: Lazy<PathBuf> = Lazy::new(|| PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../fixtures"));

#[derive(Debug, Deserialize)]
struct Case {
    schema: Schema,
    wire: Value,
    flat: FlatMap,
}

fn run_case(case: &Case) -> Result<(), String> {
    case.schema.validate().map_err(|e| format!("schema: {e}"))?;
    let flat = flatten_value(&case.schema, &case.wire).map_err(|e| format!("flatten: {e}"))?;
    let got: Vec<_> = flat.iter().collect();
    let want: Vec<_> = case.flat.iter().collect();
    if got != want {
        return Err(format!(
            "flatten mismatch\n  want: {}\n  got:  {}",
            case.flat.to_json(),
            flat.to_json()
        ));
    }
    let wire = resolve_value(&case.schema, &case.flat)
        .map_err(|e| format!("resolve: {e}"))?
        .unwrap_or(Value::Null);
    if wire != case.wire {
        return Err(format!("resolve mismatch\n  want: {}\n  got:  {wire}", case.wire));
    }
    Ok(())
}

fn main() -> ExitCode {
    let filter = match std::env::args().nth(1).map(|f| Regex::new(&f)).transpose() {
        Ok(x) => x,
        Err(error) => {
            eprintln!("invalid filter: {error}");
            return ExitCode::FAILURE;
        }
    };
    let mut paths: Vec<PathBuf> = match std::fs::read_dir(&*FIXTURE_DIR) {
        Ok(entries) => entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect(),
        Err(error) => {
            eprintln!("cannot read {}: {error}", FIXTURE_DIR.display());
            return ExitCode::FAILURE;
        }
    };
    paths.sort();

    let mut failed = 0;
    let mut ran = 0;
    for path in paths {
        let name = path.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default();
        if filter.as_ref().is_some_and(|re| !re.is_match(&name)) {
            continue;
        }
        ran += 1;
        let outcome = std::fs::read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|src| from_str_with_path::<Case>(&src).map_err(|e| e.to_string()))
            .and_then(|case| run_case(&case));
        match outcome {
            Ok(()) => eprintln!("✅ {name}"),
            Err(error) => {
                failed += 1;
                eprintln!("❌ {name}: {error}");
            }
        }
    }
    eprintln!("{ran} case(s), {failed} failed");
    if failed > 0 { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}
