use chrono::{DateTime, SecondsFormat, Utc};

use super::types::{Category, ContainerRecord, Lifecycle, SourceRecord, WorkItem};

/// Ordered title keywords. The first match wins; no match means `Primary`.
const CATEGORY_KEYWORDS: &[(&str, Category)] = &[
    ("quiz", Category::Quiz),
    ("discussion", Category::Discussion),
];

/// Derives a category from a record title using case-insensitive keyword matching.
pub fn categorize(title: &str) -> Category {
    let lower = title.to_lowercase();

    CATEGORY_KEYWORDS
        .iter()
        .find(|(keyword, _)| lower.contains(keyword))
        .map(|&(_, category)| category)
        .unwrap_or(Category::Primary)
}

/// A deadline exactly at `now` is still upcoming; only strictly earlier is overdue.
pub fn lifecycle(deadline: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Lifecycle {
    match deadline {
        None => Lifecycle::NoDeadline,
        Some(d) if d < now => Lifecycle::Overdue,
        Some(_) => Lifecycle::Upcoming,
    }
}

fn container_label(container_id: &str, containers: Option<&[ContainerRecord]>) -> String {
    containers
        .and_then(|list| list.iter().find(|c| c.id == container_id))
        .map(|c| c.name.clone())
        .unwrap_or_else(|| format!("Container ID: {container_id}"))
}

fn finite_weight(weight: Option<f64>) -> f64 {
    match weight {
        Some(w) if w.is_finite() => w,
        _ => 0.0,
    }
}

/// Normalizes source records into work items against a fixed clock.
///
/// Pure: the same records, containers and `now` always produce the same
/// items. Records whose container is unknown are kept with a synthesized label.
pub fn classify(
    records: &[SourceRecord],
    containers: Option<&[ContainerRecord]>,
    now: DateTime<Utc>,
) -> Vec<WorkItem> {
    records
        .iter()
        .map(|record| WorkItem {
            id: record.id.clone(),
            category: categorize(&record.title),
            title: record.title.clone(),
            container_label: container_label(&record.container_id, containers),
            deadline: record
                .deadline
                .map(|d| d.to_rfc3339_opts(SecondsFormat::Secs, true))
                .unwrap_or_default(),
            lifecycle: lifecycle(record.deadline, now),
            weight: finite_weight(record.weight),
        })
        .collect()
}

/// [`classify`] against the wall clock.
pub fn classify_now(
    records: &[SourceRecord],
    containers: Option<&[ContainerRecord]>,
) -> Vec<WorkItem> {
    classify(records, containers, Utc::now())
}
