//! Workflow input parsing.
//!
//! Accepts a file path, a directory (every file inside is processed), a
//! shell glob, or a `key=value;key=value` string with embedded JSON
//! values, and folds everything into a single flat mapping.

use std::path::Path;

use indexmap::IndexMap;
use serde_json::Value;
use snafu::prelude::*;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Invalid input format: {message}: {inputs}"))]
    Format { message: String, inputs: String },

    #[snafu(display("\"{inputs}\" is not valid YAML: {message}"))]
    Yaml { message: String, inputs: String },

    #[snafu(display("Invalid inputs structure (expected a mapping): {inputs}"))]
    InvalidStructure { inputs: String },

    #[snafu(display("I/O error: {source}"))]
    Io { source: std::io::Error },
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<std::io::Error> for Error {
    fn from(source: std::io::Error) -> Self {
        Error::Io { source }
    }
}

/// Parse every source into one flat `name → value` mapping. Later
/// sources override earlier ones.
pub fn parse_inputs<I, S>(sources: I) -> Result<IndexMap<String, Value>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut parsed = IndexMap::new();
    for source in sources {
        let source = source.as_ref();
        let path = Path::new(source);

        if path.is_dir() {
            for entry in std::fs::read_dir(path)? {
                let entry = entry?;
                if entry.file_type()?.is_file() {
                    parse_file(&entry.path(), &mut parsed)?;
                }
            }
            continue;
        }

        let matches: Vec<_> = glob::glob(source)
            .map(|paths| paths.filter_map(std::result::Result::ok).collect())
            .unwrap_or_default();
        if !matches.is_empty() {
            for path in matches {
                parse_file(&path, &mut parsed)?;
            }
            continue;
        }

        parse_pairs(source, &mut parsed)?;
    }
    Ok(parsed)
}

fn parse_file(path: &Path, parsed: &mut IndexMap<String, Value>) -> Result<()> {
    tracing::info!(path = %path.display(), "processing inputs source");
    let content = std::fs::read_to_string(path)?;
    let value: Value = serde_yaml::from_str(&content).map_err(|e| Error::Yaml {
        message: e.to_string(),
        inputs: path.display().to_string(),
    })?;
    match value {
        Value::Object(mapping) => {
            for (key, value) in mapping {
                parsed.insert(key, value);
            }
            Ok(())
        }
        Value::Null => Ok(()),
        _ => InvalidStructureSnafu {
            inputs: path.display().to_string(),
        }
        .fail(),
    }
}

/// A `k=v;k=v` string; a whole-string JSON object is accepted too.
fn parse_pairs(source: &str, parsed: &mut IndexMap<String, Value>) -> Result<()> {
    let trimmed = source.trim();

    if let Ok(Value::Object(mapping)) = serde_json::from_str::<Value>(trimmed) {
        for (key, value) in mapping {
            parsed.insert(key, value);
        }
        return Ok(());
    }

    for pair in trimmed.split(';') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        let (key, value) = pair.split_once('=').ok_or_else(|| Error::Format {
            message: "expected key=value".to_string(),
            inputs: pair.to_string(),
        })?;
        let value = value.trim();
        // Embedded JSON values keep their type; everything else is a
        // plain string.
        let value = serde_json::from_str::<Value>(value)
            .unwrap_or_else(|_| Value::String(value.to_string()));
        parsed.insert(key.trim().to_string(), value);
    }
    Ok(())
}
