use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// An assignment as returned by the upstream learning-management service.
///
/// Snapshots are never mutated locally; a fresh fetch replaces them.
/// Deserialization never rejects a present record over a single odd field:
/// nulls and wrong types fall back to empty values, unparseable deadlines and
/// non-numeric weights become `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceRecord {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub category_hint: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub container_id: String,
    #[serde(default, deserialize_with = "lenient_deadline")]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_weight")]
    pub weight: Option<f64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub link: String,
}

impl SourceRecord {
    /// Stand-in for an entry that is not even an object. It still counts as
    /// outstanding; its raw JSON becomes the id.
    pub fn unreadable(raw: &Value) -> Self {
        let id = match raw {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        Self {
            id,
            ..Self::default()
        }
    }
}

/// The grouping a record belongs to (a course).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRecord {
    #[serde(deserialize_with = "lenient_string")]
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    Primary,
    Quiz,
    Discussion,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Primary => write!(f, "assignment"),
            Category::Quiz => write!(f, "quiz"),
            Category::Discussion => write!(f, "discussion"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Lifecycle {
    Upcoming,
    Overdue,
    NoDeadline,
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lifecycle::Upcoming => write!(f, "upcoming"),
            Lifecycle::Overdue => write!(f, "overdue"),
            Lifecycle::NoDeadline => write!(f, "no deadline"),
        }
    }
}

/// Canonical, display-ready view of a [`SourceRecord`].
///
/// Derived on every classification pass and never treated as the source of
/// truth. `deadline` is an RFC 3339 string, or empty when the record has none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: String,
    pub category: Category,
    pub title: String,
    pub container_label: String,
    pub deadline: String,
    pub lifecycle: Lifecycle,
    pub weight: f64,
}

// Upstream ids arrive as JSON numbers from some endpoints and strings from others.
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

fn lenient_weight<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Value::deserialize(deserializer)?.as_f64())
}

fn lenient_deadline<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Value::String(raw) = Value::deserialize(deserializer)? else {
        return Ok(None);
    };
    Ok(parse_deadline(&raw))
}

/// RFC 3339, or a bare `YYYY-MM-DD` read as midnight UTC.
fn parse_deadline(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc())
}
