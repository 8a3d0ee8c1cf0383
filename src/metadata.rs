use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::ser::Formatter;
use serde_json::{Map, Value};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use crate::error::{GenError, GenResult};

pub const METADATA_FILE: &str = "metadata.jsonl";

/// One line of `metadata.jsonl`. `ground_truth` holds a JSON document
/// encoded as a string: `{"gt_parse": {<task>: <value>, ...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub file_name: String,
    pub ground_truth: String,
}

impl MetadataRecord {
    pub fn gt_parse(&self) -> GenResult<Map<String, Value>> {
        let value: Value = serde_json::from_str(&self.ground_truth)
            .map_err(|err| GenError::invalid(format!("{}: bad ground truth: {}", self.file_name, err)))?;
        match value {
            Value::Object(mut object) => match object.remove("gt_parse") {
                Some(Value::Object(fields)) => Ok(fields),
                _ => Err(GenError::invalid(format!(
                    "{}: ground truth has no gt_parse object",
                    self.file_name
                ))),
            },
            _ => Err(GenError::invalid(format!(
                "{}: ground truth is not an object",
                self.file_name
            ))),
        }
    }

    pub fn set_gt_parse(&mut self, fields: Map<String, Value>) -> GenResult<()> {
        let mut root = Map::new();
        root.insert("gt_parse".to_string(), Value::Object(fields));
        self.ground_truth = to_spaced_json(&Value::Object(root))?;
        Ok(())
    }

    pub fn to_line(&self) -> GenResult<String> {
        to_spaced_json(self)
    }
}

/// Pairs task names with their values under `gt_parse`.
pub fn format_metadata(file_name: &str, keys: &[&str], values: Vec<Value>) -> GenResult<MetadataRecord> {
    if keys.len() != values.len() {
        return Err(GenError::invalid(format!(
            "length does not match: keys({}), values({})",
            keys.len(),
            values.len()
        )));
    }
    let fields = keys
        .iter()
        .map(|key| key.to_string())
        .zip(values)
        .collect::<Map<_, _>>();
    let mut record = MetadataRecord {
        file_name: file_name.to_string(),
        ground_truth: String::new(),
    };
    record.set_gt_parse(fields)?;
    Ok(record)
}

pub fn append_metadata(path: &Path, records: &[MetadataRecord]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory: {}", parent.display()))?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open metadata: {}", path.display()))?;
    let mut buffer = String::new();
    for record in records {
        buffer.push_str(&record.to_line()?);
        buffer.push('\n');
    }
    file.write_all(buffer.as_bytes())
        .with_context(|| format!("failed to write metadata: {}", path.display()))?;
    Ok(())
}

pub fn read_metadata(path: &Path) -> Result<Vec<MetadataRecord>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read metadata: {}", path.display()))?;
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str(line).with_context(|| {
                format!("failed to parse metadata: {}:{}", path.display(), index + 1)
            })
        })
        .collect()
}

/// Writes `", "` and `": "` separators, the layout dataset loaders expect.
struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_array_value<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_key<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b": ")
    }
}

fn to_spaced_json<T: Serialize + ?Sized>(value: &T) -> GenResult<String> {
    let mut serializer = serde_json::Serializer::with_formatter(Vec::new(), SpacedFormatter);
    value
        .serialize(&mut serializer)
        .map_err(|err| GenError::invalid(format!("failed to encode metadata: {}", err)))?;
    String::from_utf8(serializer.into_inner())
        .map_err(|err| GenError::invalid(format!("failed to encode metadata: {}", err)))
}
