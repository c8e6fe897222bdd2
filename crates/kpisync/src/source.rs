//! Scraping values from commands and JSON endpoints.

use std::process::Command;
use std::time::Duration;

use kpisync_common::CellValue;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

static LEADING_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([+-]?\d+(?:\.\d+)?)").expect("leading number regex must compile")
});

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("cannot start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{program}` exited with {status}: {stderr}")]
    Exit {
        program: String,
        status: String,
        stderr: String,
    },
    #[error("fetching {url} failed: {message}")]
    Fetch { url: String, message: String },
    #[error("`{path}` not found in response")]
    Pick { path: String },
    #[error("expected a number, got `{0}`")]
    NotNumeric(String),
    #[error("`{path}` does not hold a scalar")]
    NotScalar { path: String },
    #[error("`{path}` must be an array of {{key, val}} objects or an object")]
    RecordShape { path: String },
}

/// Where a value comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSource {
    Command { program: String, args: Vec<String> },
    Http { url: String, pick: String },
}

/// One keyed value produced by a source.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub key: String,
    pub value: CellValue,
}

impl Record {
    pub fn new(key: impl Into<String>, value: impl Into<CellValue>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Side-effecting half of a source: run a program or fetch a document.
pub trait Scraper {
    /// Run `program` and return its stdout. A non-zero exit is an error.
    fn run_command(&self, program: &str, args: &[String]) -> Result<String, SourceError>;

    fn fetch_json(&self, url: &str) -> Result<Value, SourceError>;
}

/// Runs real processes and performs real HTTP requests.
#[derive(Debug, Clone)]
pub struct SystemScraper {
    client: reqwest::blocking::Client,
}

impl SystemScraper {
    pub fn new() -> Result<Self, SourceError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|e| SourceError::Fetch {
                url: String::new(),
                message: format!("cannot build HTTP client: {e}"),
            })?;
        Ok(Self { client })
    }
}

impl Scraper for SystemScraper {
    fn run_command(&self, program: &str, args: &[String]) -> Result<String, SourceError> {
        debug!(program, ?args, "running command");
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|source| SourceError::Spawn {
                program: program.to_string(),
                source,
            })?;
        if !output.status.success() {
            return Err(SourceError::Exit {
                program: program.to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn fetch_json(&self, url: &str) -> Result<Value, SourceError> {
        debug!(url, "fetching");
        let fetch_err = |e: reqwest::Error| SourceError::Fetch {
            url: url.to_string(),
            message: e.to_string(),
        };
        self.client
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(fetch_err)?
            .json()
            .map_err(fetch_err)
    }
}

impl ValueSource {
    /// Produce a single value.
    ///
    /// Command output must start with a number. A picked JSON value may be
    /// any scalar; numeric strings are read as numbers.
    pub fn scalar<P: Scraper + ?Sized>(&self, scraper: &P) -> Result<CellValue, SourceError> {
        match self {
            ValueSource::Command { program, args } => {
                parse_scalar(&scraper.run_command(program, args)?)
            }
            ValueSource::Http { url, pick: path } => {
                let doc = scraper.fetch_json(url)?;
                let value = pick(&doc, path).ok_or_else(|| SourceError::Pick { path: path.clone() })?;
                match value {
                    Value::Array(_) | Value::Object(_) => {
                        Err(SourceError::NotScalar { path: path.clone() })
                    }
                    Value::String(s) => Ok(numeric_text(s)),
                    other => Ok(CellValue::from_json(other)),
                }
            }
        }
    }

    /// Produce keyed records.
    ///
    /// Command output is newline-delimited JSON `{"key": .., "val": ..}`;
    /// a picked JSON value is an array of such objects or a key -> value map.
    pub fn records<P: Scraper + ?Sized>(&self, scraper: &P) -> Result<Vec<Record>, SourceError> {
        match self {
            ValueSource::Command { program, args } => {
                Ok(parse_records(&scraper.run_command(program, args)?))
            }
            ValueSource::Http { url, pick: path } => {
                let doc = scraper.fetch_json(url)?;
                let value = pick(&doc, path).ok_or_else(|| SourceError::Pick { path: path.clone() })?;
                records_from_json(value).ok_or_else(|| SourceError::RecordShape { path: path.clone() })
            }
        }
    }
}

/// Leading integer of `text`, else leading decimal.
pub fn parse_scalar(text: &str) -> Result<CellValue, SourceError> {
    let caps = LEADING_NUMBER
        .captures(text)
        .ok_or_else(|| SourceError::NotNumeric(text.trim().to_string()))?;
    let number = &caps[1];
    if let Ok(int) = number.parse::<i64>() {
        return Ok(CellValue::Int(int));
    }
    number
        .parse::<f64>()
        .map(CellValue::Number)
        .map_err(|_| SourceError::NotNumeric(text.trim().to_string()))
}

fn numeric_text(text: &str) -> CellValue {
    let trimmed = text.trim();
    if let Ok(int) = trimmed.parse::<i64>() {
        CellValue::Int(int)
    } else if let Ok(num) = trimmed.parse::<f64>() {
        CellValue::Number(num)
    } else {
        CellValue::from(text)
    }
}

#[derive(Deserialize)]
struct RawRecord {
    key: Value,
    #[serde(default)]
    val: Value,
}

/// Parse newline-delimited `{"key", "val"}` objects. Blank lines are ignored;
/// malformed lines are logged and skipped.
pub fn parse_records(text: &str) -> Vec<Record> {
    let mut records = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<RawRecord>(line) {
            Ok(raw) => match key_text(&raw.key) {
                Some(key) => records.push(Record {
                    key,
                    value: CellValue::from_json(&raw.val),
                }),
                None => warn!(line = idx + 1, "record key must be a string or number; skipped"),
            },
            Err(err) => warn!(line = idx + 1, error = %err, "malformed record; skipped"),
        }
    }
    records
}

fn key_text(key: &Value) -> Option<String> {
    match key {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(CellValue::from_json(&Value::Number(n.clone())).canonical()),
        _ => None,
    }
}

fn records_from_json(value: &Value) -> Option<Vec<Record>> {
    match value {
        Value::Array(items) => {
            let mut records = Vec::with_capacity(items.len());
            for item in items {
                let Ok(raw) = RawRecord::deserialize(item) else {
                    warn!(item = %item, "array element is not a {{key, val}} object; skipped");
                    continue;
                };
                match key_text(&raw.key) {
                    Some(key) => records.push(Record {
                        key,
                        value: CellValue::from_json(&raw.val),
                    }),
                    None => warn!(item = %item, "record key must be a string or number; skipped"),
                }
            }
            Some(records)
        }
        Value::Object(map) => Some(
            map.iter()
                .map(|(key, val)| Record {
                    key: key.trim().to_string(),
                    value: CellValue::from_json(val),
                })
                .collect(),
        ),
        _ => None,
    }
}

/// Resolve a dotted path (`data.items[0].count`) or a JSON pointer
/// (`/data/items/0/count`) against `doc`. `""` and `"."` select the root.
pub fn pick<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    let path = path.trim();
    if path.starts_with('/') {
        return doc.pointer(path);
    }
    if path.is_empty() || path == "." {
        return Some(doc);
    }
    let mut pointer = String::new();
    for segment in path.split('.') {
        let (name, indexes) = match segment.find('[') {
            Some(pos) => segment.split_at(pos),
            None => (segment, ""),
        };
        if !name.is_empty() {
            pointer.push('/');
            pointer.push_str(&name.replace('~', "~0").replace('/', "~1"));
        }
        let mut rest = indexes;
        while let Some(inner) = rest.strip_prefix('[') {
            let end = inner.find(']')?;
            pointer.push('/');
            pointer.push_str(inner[..end].trim());
            rest = &inner[end + 1..];
        }
        if !rest.is_empty() {
            return None;
        }
    }
    doc.pointer(&pointer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalar_takes_leading_number() {
        assert_eq!(parse_scalar("42\n").unwrap(), CellValue::Int(42));
        assert_eq!(parse_scalar("  -7 open issues").unwrap(), CellValue::Int(-7));
        assert_eq!(parse_scalar("3.25").unwrap(), CellValue::Number(3.25));
        assert!(matches!(parse_scalar("n/a"), Err(SourceError::NotNumeric(_))));
        assert!(parse_scalar("").is_err());
    }

    #[test]
    fn ndjson_skips_blank_and_bad_lines() {
        let text = "{\"key\":\"k1\",\"val\":1}\n\nnot json\n{\"key\":7,\"val\":\"x\"}\n{\"val\":2}\n";
        let records = parse_records(text);
        assert_eq!(
            records,
            vec![Record::new("k1", 1i64), Record::new("7", "x")]
        );
    }

    #[test]
    fn dotted_paths_and_pointers() {
        let doc = json!({"data": {"items": [{"count": 3}, {"count": 5}], "a/b": 1}});
        assert_eq!(pick(&doc, "data.items[1].count"), Some(&json!(5)));
        assert_eq!(pick(&doc, "/data/items/0/count"), Some(&json!(3)));
        assert_eq!(pick(&doc, "data.a/b"), Some(&json!(1)));
        assert_eq!(pick(&doc, "."), Some(&doc));
        assert_eq!(pick(&doc, "data.missing"), None);
        assert_eq!(pick(&doc, "data.items[9]"), None);
    }

    #[test]
    fn json_records_from_array_or_map() {
        let array = json!([{"key": "a", "val": 1}, {"nope": true}, {"key": "b", "val": null}]);
        assert_eq!(
            records_from_json(&array).unwrap(),
            vec![Record::new("a", 1i64), Record::new("b", CellValue::Empty)]
        );
        let map = json!({"x": 2.5, "y": "z"});
        assert_eq!(
            records_from_json(&map).unwrap(),
            vec![Record::new("x", 2.5), Record::new("y", "z")]
        );
        assert!(records_from_json(&json!(3)).is_none());
    }

    struct Canned(&'static str, Value);

    impl Scraper for Canned {
        fn run_command(&self, _program: &str, _args: &[String]) -> Result<String, SourceError> {
            Ok(self.0.to_string())
        }

        fn fetch_json(&self, _url: &str) -> Result<Value, SourceError> {
            Ok(self.1.clone())
        }
    }

    #[test]
    fn http_scalar_accepts_numeric_strings() {
        let scraper = Canned("", json!({"total": "12", "label": "2024-05", "list": [1]}));
        let source = |pick: &str| ValueSource::Http {
            url: "https://example.test".into(),
            pick: pick.into(),
        };
        assert_eq!(source("total").scalar(&scraper).unwrap(), CellValue::Int(12));
        assert_eq!(source("label").scalar(&scraper).unwrap(), CellValue::from("2024-05"));
        assert!(matches!(
            source("list").scalar(&scraper),
            Err(SourceError::NotScalar { .. })
        ));
        assert!(matches!(
            source("gone").scalar(&scraper),
            Err(SourceError::Pick { .. })
        ));
    }
}
