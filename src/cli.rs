//! Command line front end: drive flatten / resolve from a schema file.
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use rayon::prelude::*;
use serde_json::Value;

use crate::flatten::{flatten_value, flatten_value_with, FlattenOptions};
use crate::resolve::resolve_value;
use crate::schema::Schema;
use crate::store::FlatMap;

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// convert JSON documents to and from the flat key/value store form described by a schema
#[derive(Parser, Debug)]
pub struct CommandLineInterface {
    /// debug-level logging (RUST_LOG overrides)
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// flatten wire-form documents into flat stores
    Flatten(FlattenOut),
    /// resolve flat stores back into wire-form documents
    Resolve(ResolveOut),
    /// check that each wire-form document survives flatten → resolve → flatten unchanged
    Check(CheckRun),
}

#[derive(Args, Debug, Clone)]
struct InputSettings {
    /// schema JSON file, as produced by serializing a `Schema`
    #[arg(long, short)]
    schema: PathBuf,

    /// treat input as newline-delimited JSON (NDJSON)
    #[arg(long, default_value_t = false)]
    ndjson: bool,

    /// JSON Pointer to select a subnode in each document (e.g. /data/items/0/payload)
    #[arg(long)]
    json_pointer: Option<String>,

    /// JQ pre-process filter for each document.
    #[arg(long)]
    jq_expr: Option<String>,

    /// One or more inputs. May be literal paths or quoted glob patterns
    #[arg(long, short, num_args = 1.., required = true)]
    input: Vec<String>,
}

#[derive(clap::Parser, Debug)]
struct FlattenOut {
    #[command(flatten)]
    input_settings: InputSettings,

    /// skip fields computed by the remote side (create payloads)
    #[arg(long, default_value_t = false)]
    omit_computed: bool,

    /// output .json file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,
}

#[derive(clap::Parser, Debug)]
struct ResolveOut {
    #[command(flatten)]
    input_settings: InputSettings,

    /// output .json file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,
}

#[derive(clap::Parser, Debug)]
struct CheckRun {
    #[command(flatten)]
    input_settings: InputSettings,
}

/// One input document and where it came from.
#[derive(Debug, Clone)]
struct Document {
    label: String,
    value: Value,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl InputSettings {
    fn load_schema(&self) -> Result<Schema> {
        let source = std::fs::read_to_string(&self.schema)
            .with_context(|| format!("failed to read schema file {}", self.schema.display()))?;
        let schema: Schema = crate::path_de::from_str_with_path(&source)
            .with_context(|| format!("invalid schema file {}", self.schema.display()))?;
        schema
            .validate()
            .with_context(|| format!("schema file {} cannot address a flat store", self.schema.display()))?;
        Ok(schema)
    }

    fn load_documents(&self) -> Result<Vec<Document>> {
        let source_paths = resolve_file_path_patterns(&self.input).context("failed to resolve input file paths")?;
        let mut out = Vec::new();
        for source_path in source_paths {
            let source_path_str = source_path.to_string_lossy().to_string();
            let source = std::fs::read_to_string(&source_path)
                .with_context(|| format!("failed to read source file {source_path_str}"))?;
            for (i, json_value) in self.parse_source(&source, &source_path_str)?.into_iter().enumerate() {
                let json_value = match self.json_pointer.as_deref() {
                    None => json_value,
                    Some(pointer) => match json_value.pointer(pointer) {
                        Some(x) => x.clone(),
                        None => bail!("JSON pointer {pointer} selects nothing in {source_path_str}"),
                    },
                };
                let values = match self.jq_expr.as_ref() {
                    None => vec![json_value],
                    Some(jq_expr) => crate::jq_exec::run_jaq(jq_expr, &json_value).with_context(|| {
                        format!("failed to apply jq expression to source file ({source_path_str})")
                    })?,
                };
                for (j, value) in values.into_iter().enumerate() {
                    out.push(Document { label: format!("{source_path_str}#{i}.{j}"), value });
                }
            }
        }
        tracing::debug!(count = out.len(), "loaded input documents");
        Ok(out)
    }

    fn parse_source(&self, source: &str, source_path_str: &str) -> Result<Vec<Value>> {
        if !self.ndjson {
            let value = serde_json::from_str::<Value>(source)
                .with_context(|| format!("failed to parse JSON source file ({source_path_str})"))?;
            return Ok(vec![value]);
        }
        source
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(n, line)| {
                serde_json::from_str::<Value>(line)
                    .with_context(|| format!("failed to parse line {} of {source_path_str}", n + 1))
            })
            .collect()
    }
}

impl CommandLineInterface {
    pub fn load() -> Self {
        Self::parse()
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    pub fn run(&self) -> Result<()> {
        match &self.cmd {
            Command::Flatten(target) => {
                let schema = target.input_settings.load_schema()?;
                let options = FlattenOptions { omit_computed: target.omit_computed };
                let mut results = Vec::new();
                for doc in target.input_settings.load_documents()? {
                    let flat = flatten_value_with(&schema, &doc.value, options)
                        .with_context(|| format!("failed to flatten {}", doc.label))?;
                    results.push(flat.to_json());
                }
                write_output(target.out.as_deref(), results)
            }
            Command::Resolve(target) => {
                let schema = target.input_settings.load_schema()?;
                let mut results = Vec::new();
                for doc in target.input_settings.load_documents()? {
                    let flat: FlatMap = crate::path_de::from_value_with_path(doc.value)
                        .with_context(|| format!("{} is not a flat store", doc.label))?;
                    let value = resolve_value(&schema, &flat)
                        .with_context(|| format!("failed to resolve {}", doc.label))?;
                    results.push(value.unwrap_or(Value::Null));
                }
                write_output(target.out.as_deref(), results)
            }
            Command::Check(target) => {
                let schema = target.input_settings.load_schema()?;
                let docs = target.input_settings.load_documents()?;
                let outcomes: Vec<(String, Result<()>)> = docs
                    .par_iter()
                    .map(|doc| (doc.label.clone(), check_round_trip(&schema, &doc.value)))
                    .collect();
                let mut failed = 0usize;
                for (label, outcome) in &outcomes {
                    match outcome {
                        Ok(()) => eprintln!("{} {label}", "✓".green()),
                        Err(error) => {
                            failed += 1;
                            eprintln!("{} {label}: {error:#}", "✗".red());
                        }
                    }
                }
                let summary = format!("{} passed, {} failed", outcomes.len() - failed, failed);
                if failed > 0 {
                    eprintln!("{}", summary.red().bold());
                    bail!("{failed} document(s) failed the round-trip check");
                }
                eprintln!("{}", summary.green().bold());
                Ok(())
            }
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

/// flatten → resolve → flatten must write the same entries in the same order.
fn check_round_trip(schema: &Schema, wire: &Value) -> Result<()> {
    let first = flatten_value(schema, wire).context("flatten")?;
    let resolved = resolve_value(schema, &first).context("resolve")?.unwrap_or(Value::Null);
    let second = flatten_value(schema, &resolved).context("re-flatten")?;
    let a: Vec<_> = first.iter().collect();
    let b: Vec<_> = second.iter().collect();
    if a != b {
        let diverged = a
            .iter()
            .zip(&b)
            .find(|(x, y)| x != y)
            .map(|(x, _)| x.0.to_string())
            .unwrap_or_else(|| format!("entry count {} vs {}", a.len(), b.len()));
        bail!("flat store changed after one round trip, first difference at `{diverged}`");
    }
    Ok(())
}

fn write_output(out: Option<&Path>, mut results: Vec<Value>) -> Result<()> {
    let payload = if results.len() == 1 { results.remove(0) } else { Value::Array(results) };
    let src = serde_json::to_string_pretty(&payload)?;
    match out {
        Some(out) => {
            if let Some(parent) = out.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(out, &src).with_context(|| format!("failed to write {}", out.display()))?;
        }
        None => println!("{src}"),
    }
    Ok(())
}

fn resolve_file_path_patterns<I>(patterns: I) -> Result<Vec<PathBuf>>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    fn has_glob_chars(s: &str) -> bool {
        // Minimal glob detection for the `glob` crate syntax.
        s.bytes().any(|b| matches!(b, b'*' | b'?' | b'[' | b'{'))
    }

    let mut out = Vec::<PathBuf>::new();

    for raw in patterns {
        let pattern = raw.as_ref();

        if has_glob_chars(pattern) {
            let mut matched_any = false;
            for entry in glob::glob(pattern)? {
                matched_any = true;
                out.push(entry?);
            }
            if !matched_any {
                bail!("glob pattern matched no files: {pattern}");
            }
        } else {
            out.push(PathBuf::from(pattern));
        }
    }

    Ok(out)
}
