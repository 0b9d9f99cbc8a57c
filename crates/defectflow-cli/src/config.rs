//! Workflow configuration for the command line.
//!
//! Values are resolved per setting with the precedence
//! command-line flag > `--set` override > config file > built-in default.

mod builder;
mod defaults;
mod file;
mod models;

pub use builder::{analyze_config, build_config, relax_config, scf_config};
pub use file::FileConfig;
pub use models::{AnalyzeAppConfig, BuildAppConfig, RelaxAppConfig, ScfAppConfig};

use crate::cli::ConfigArgs;
use crate::error::{CliError, Result};
use crate::utils::parser;
use tracing::debug;

/// Reads the optional config file and applies `--set` overrides on top of it.
pub fn load(args: &ConfigArgs) -> Result<FileConfig> {
    let mut table = match &args.config {
        Some(path) => file::read_table(path)?,
        None => toml::Table::new(),
    };
    apply_set_values(&mut table, &args.set_values)?;

    FileConfig::from_table(table).map_err(|e| match &args.config {
        Some(path) => CliError::FileParsing {
            path: path.clone(),
            source: e.into(),
        },
        None => CliError::Config(e.to_string()),
    })
}

fn apply_set_values(table: &mut toml::Table, set_values: &[String]) -> Result<()> {
    for kv_pair in set_values {
        let (key, value_str) =
            parser::parse_key_value(kv_pair).map_err(|e| CliError::Config(e.to_string()))?;
        debug!("Applying override {} = {}", key, value_str);

        let mut segments: Vec<&str> = key.split('.').collect();
        let Some(leaf) = segments.pop() else {
            continue;
        };
        let mut current = &mut *table;
        for segment in segments {
            let entry = current
                .entry(segment.to_string())
                .or_insert(toml::Value::Table(toml::Table::new()));
            current = entry.as_table_mut().ok_or_else(|| {
                CliError::Config(format!(
                    "Cannot override '{}': '{}' is not a section.",
                    key, segment
                ))
            })?;
        }
        current.insert(leaf.to_string(), parse_override_value(value_str));
    }
    Ok(())
}

/// Interprets an override as a TOML value, falling back to a plain string so
/// that paths and element symbols need no quoting.
fn parse_override_value(value: &str) -> toml::Value {
    format!("value = {}", value)
        .parse::<toml::Table>()
        .ok()
        .and_then(|mut table| table.remove("value"))
        .unwrap_or_else(|| toml::Value::String(value.to_string()))
}
