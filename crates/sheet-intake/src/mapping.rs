use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::{IntakeError, IntakeResult};

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Submission(Map<String, Value>);

impl Submission {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    // Literal key first, then a dotted path such as `racer.name`.
    pub fn lookup(&self, key: &str) -> Option<&Value> {
        if let Some(value) = self.0.get(key) {
            return Some(value);
        }
        let mut parts = key.split('.');
        let mut current = self.0.get(parts.next()?)?;
        for part in parts {
            current = current.as_object()?.get(part)?;
        }
        Some(current)
    }

    pub fn first_of<'a>(&'a self, keys: &[String]) -> Option<&'a Value> {
        keys.iter()
            .filter_map(|key| self.lookup(key))
            .find(|value| !value.is_null())
    }

    pub fn applicant_name(&self) -> Option<&str> {
        ["name", "userName"]
            .iter()
            .filter_map(|key| self.0.get(*key))
            .find_map(Value::as_str)
    }
}

impl From<Map<String, Value>> for Submission {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum CellValue {
    Empty,
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl CellValue {
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Self::Empty,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => n.as_f64().map(Self::Float).unwrap_or(Self::Empty),
            },
            Value::String(s) => Self::String(s.clone()),
            Value::Array(_) | Value::Object(_) => Self::String(value.to_string()),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

impl Serialize for CellValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Empty => serializer.serialize_str(""),
            Self::String(s) => serializer.serialize_str(s),
            Self::Int(i) => serializer.serialize_i64(*i),
            Self::Float(f) => serializer.serialize_f64(*f),
            Self::Bool(b) => serializer.serialize_bool(*b),
        }
    }
}

pub type Row = Vec<CellValue>;

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ColumnSource {
    EntryNo,
    Timestamp {
        #[serde(default = "default_timestamp_keys")]
        keys: Vec<String>,
    },
    Field { keys: Vec<String> },
    Json { keys: Vec<String> },
}

fn default_timestamp_keys() -> Vec<String> {
    vec!["timestamp".to_string()]
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ColumnSpec {
    pub header: String,
    #[serde(flatten)]
    pub source: ColumnSource,
}

impl ColumnSpec {
    fn field(header: &str, keys: &[&str]) -> Self {
        Self {
            header: header.to_string(),
            source: ColumnSource::Field {
                keys: keys.iter().map(|k| k.to_string()).collect(),
            },
        }
    }
}

#[derive(Clone, Debug)]
pub struct RowContext {
    pub entry_no: u64,
    pub received_at: String,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ColumnMapping {
    pub name: String,
    pub columns: Vec<ColumnSpec>,
}

impl Default for ColumnMapping {
    fn default() -> Self {
        let columns = vec![
            ColumnSpec {
                header: "No".to_string(),
                source: ColumnSource::EntryNo,
            },
            ColumnSpec {
                header: "Timestamp".to_string(),
                source: ColumnSource::Timestamp {
                    keys: default_timestamp_keys(),
                },
            },
            ColumnSpec::field("Name", &["name", "userName"]),
            ColumnSpec::field("Phone", &["phone"]),
            ColumnSpec::field("Gender", &["gender"]),
            ColumnSpec::field("Region", &["region"]),
            ColumnSpec::field("Rank", &["rank"]),
            ColumnSpec::field("Team Size", &["team_size"]),
            ColumnSpec::field("Recruit Avg", &["recruit_avg"]),
            ColumnSpec::field("Career", &["career"]),
            ColumnSpec::field("Income", &["income"]),
            ColumnSpec::field("History", &["history"]),
            ColumnSpec::field("Style", &["style"]),
            ColumnSpec::field("Client", &["client"]),
            ColumnSpec::field("Portfolio", &["portfolio", "port"]),
            ColumnSpec::field("Continuance", &["continuance_w", "w"]),
            ColumnSpec::field("Perf Count", &["perf_count", "count"]),
            ColumnSpec::field("Perf Premium", &["perf_premium", "premium"]),
            ColumnSpec::field("MDRT", &["mdrt"]),
            ColumnSpec::field("P13", &["p13"]),
            ColumnSpec::field("P25", &["p25"]),
            ColumnSpec::field("Needs", &["needs"]),
            ColumnSpec::field("Final Bounty", &["final_bounty"]),
            ColumnSpec::field("Racer Type", &["racer_type", "racer.name"]),
            ColumnSpec {
                header: "Stats".to_string(),
                source: ColumnSource::Json {
                    keys: vec!["stats".to_string()],
                },
            },
        ];
        Self {
            name: "default".to_string(),
            columns,
        }
    }
}

impl ColumnMapping {
    pub fn from_yaml_str(input: &str) -> IntakeResult<Self> {
        let mapping: Self = serde_yaml::from_str(input)?;
        mapping.validate()?;
        Ok(mapping)
    }

    pub fn from_yaml_file(path: &Path) -> IntakeResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            IntakeError::InvalidArgument(format!(
                "failed to read column map '{}': {e}",
                path.display()
            ))
        })?;
        Self::from_yaml_str(&content)
    }

    pub fn validate(&self) -> IntakeResult<()> {
        if self.columns.is_empty() {
            return Err(IntakeError::InvalidArgument(format!(
                "column map '{}' has no columns",
                self.name
            )));
        }
        for (idx, column) in self.columns.iter().enumerate() {
            let letter = column_letter(idx);
            if column.header.trim().is_empty() {
                return Err(IntakeError::InvalidArgument(format!(
                    "column {letter} in map '{}' has an empty header",
                    self.name
                )));
            }
            let keys = match &column.source {
                ColumnSource::EntryNo => continue,
                ColumnSource::Timestamp { keys }
                | ColumnSource::Field { keys }
                | ColumnSource::Json { keys } => keys,
            };
            if keys.is_empty() || keys.iter().any(|k| k.trim().is_empty()) {
                return Err(IntakeError::InvalidArgument(format!(
                    "column {letter} ('{}') in map '{}' needs at least one non-empty key",
                    column.header, self.name
                )));
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn layout(&self) -> impl Iterator<Item = (String, &str)> + '_ {
        self.columns
            .iter()
            .enumerate()
            .map(|(idx, column)| (column_letter(idx), column.header.as_str()))
    }

    pub fn last_column_letter(&self) -> String {
        column_letter(self.columns.len().saturating_sub(1))
    }

    pub fn build_row(&self, submission: &Submission, ctx: &RowContext) -> Row {
        self.columns
            .iter()
            .map(|column| match &column.source {
                ColumnSource::EntryNo => {
                    CellValue::Int(i64::try_from(ctx.entry_no).unwrap_or(i64::MAX))
                }
                ColumnSource::Timestamp { keys } => submission
                    .first_of(keys)
                    .filter(|v| v.as_str().map_or(true, |s| !s.is_empty()))
                    .map(CellValue::from_json)
                    .unwrap_or_else(|| CellValue::String(ctx.received_at.clone())),
                ColumnSource::Field { keys } => submission
                    .first_of(keys)
                    .map(CellValue::from_json)
                    .unwrap_or(CellValue::Empty),
                ColumnSource::Json { keys } => keys
                    .iter()
                    .find_map(|key| submission.lookup(key))
                    .map(|value| CellValue::String(value.to_string()))
                    .unwrap_or(CellValue::Empty),
            })
            .collect()
    }
}

pub fn column_letter(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}
