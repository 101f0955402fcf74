use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::CompareError;
use crate::records::SourceRecord;
use crate::target::{CompareResponse, TargetService};

const ONLY_IN_SOURCE: &str = "onlyInSource";

/// Flattens a comparison payload into the records that exist upstream but
/// not in the target.
///
/// Containers are visited in payload order and each container's records keep
/// their relative order. Entries without an `onlyInSource` array contribute
/// nothing. Every element of an `onlyInSource` array counts as outstanding,
/// however badly shaped it is.
pub fn compute_outstanding(response: &CompareResponse) -> Result<Vec<SourceRecord>, CompareError> {
    let comparison = match &response.comparison {
        None | Some(Value::Null) => return Err(CompareError::Missing),
        Some(Value::Object(map)) => map,
        Some(other) => {
            return Err(CompareError::Malformed(format!(
                "expected an object keyed by container, got {}",
                json_kind(other)
            )));
        }
    };

    let mut outstanding = Vec::new();
    for (label, entry) in comparison {
        let Some(records) = entry.get(ONLY_IN_SOURCE).and_then(Value::as_array) else {
            debug!(container = %label, "comparison entry has no onlyInSource list");
            continue;
        };
        for raw in records {
            let record = SourceRecord::deserialize(raw).unwrap_or_else(|e| {
                warn!(container = %label, error = %e, "unreadable record counted as outstanding");
                SourceRecord::unreadable(raw)
            });
            outstanding.push(record);
        }
    }

    Ok(outstanding)
}

/// Runs one remote comparison and reduces it to the outstanding list.
pub async fn fetch_outstanding<T: TargetService>(
    target: &T,
    token: &str,
    target_id: &str,
) -> Result<Vec<SourceRecord>, CompareError> {
    let response = target.compare(token, target_id).await?;
    compute_outstanding(&response)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
