//! Responsibility state
//!
//! Responsibilities are the roles or positions a user holds. Notification
//! counts and lists are addressed by the set of responsibility ids.

use serde::{Deserialize, Serialize};
use serde_aux::field_attributes::deserialize_number_from_string;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// Identifier of a responsibility.
pub type ResponsibilityId = u64;

/// Error type for responsibility lists.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResponsibilityError {
    #[error("invalid responsibility id `{0}`")]
    InvalidId(String),
}

/// Parses a comma separated list of responsibility ids such as `"7,12"`.
///
/// Blank entries are skipped, so an empty string yields an empty list.
pub fn parse_responsibilities(raw: &str) -> Result<Vec<ResponsibilityId>, ResponsibilityError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            entry
                .parse::<ResponsibilityId>()
                .map_err(|_| ResponsibilityError::InvalidId(entry.to_string()))
        })
        .collect()
}

/// Joins responsibility ids into the query form expected by the API.
pub fn join_responsibilities(ids: &[ResponsibilityId]) -> String {
    ids.iter()
        .map(ResponsibilityId::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Row returned by the unread count endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct UnreadCount {
    #[serde(default, alias = "responsibility")]
    pub responsibility_id: Option<ResponsibilityId>,
    /// Sent as a string by the backend, e.g. `{"count": "3"}`.
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub count: u64,
}

/// Row returned by the notification list endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct NotificationEntry {
    pub id: Value,
    #[serde(default)]
    pub title: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub code: Option<Value>,
    #[serde(default)]
    pub sender: Option<Value>,
    #[serde(default)]
    pub receiver: Option<Value>,
}

/// Badge state published after each successful poll.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BadgeSnapshot {
    /// Sum of every count row.
    pub total: u64,
    /// Counts of the rows that name their responsibility.
    pub per_responsibility: BTreeMap<ResponsibilityId, u64>,
    /// Raw notification list from the same poll.
    pub notifications: Vec<NotificationEntry>,
}

impl BadgeSnapshot {
    /// Builds a snapshot, replacing any previous counts wholesale.
    pub fn new(counts: Vec<UnreadCount>, notifications: Vec<NotificationEntry>) -> Self {
        let mut per_responsibility = BTreeMap::new();
        let mut total: u64 = 0;
        for row in counts {
            total = total.saturating_add(row.count);
            if let Some(id) = row.responsibility_id {
                let entry = per_responsibility.entry(id).or_insert(0u64);
                *entry = entry.saturating_add(row.count);
            }
        }
        Self {
            total,
            per_responsibility,
            notifications,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_responsibility_lists() {
        assert_eq!(parse_responsibilities("7,12").unwrap(), vec![7, 12]);
        assert_eq!(parse_responsibilities(" 7 , ,12 ").unwrap(), vec![7, 12]);
        assert!(parse_responsibilities("").unwrap().is_empty());
        assert_eq!(
            parse_responsibilities("7,x"),
            Err(ResponsibilityError::InvalidId("x".into()))
        );
        assert_eq!(join_responsibilities(&[7, 12]), "7,12");
    }

    #[test]
    fn badge_total_sums_string_counts() {
        let counts: Vec<UnreadCount> =
            serde_json::from_value(json!([{ "count": "3" }, { "count": "5" }])).unwrap();
        let snapshot = BadgeSnapshot::new(counts, vec![]);
        assert_eq!(snapshot.total, 8);
        assert!(snapshot.per_responsibility.is_empty());
    }

    #[test]
    fn badge_keeps_per_responsibility_counts() {
        let counts: Vec<UnreadCount> = serde_json::from_value(json!([
            { "responsibility_id": 7, "count": 3 },
            { "responsibility_id": 12, "count": "5" },
            { "responsibility_id": 7, "count": "1" }
        ]))
        .unwrap();
        let snapshot = BadgeSnapshot::new(counts, vec![]);
        assert_eq!(snapshot.total, 9);
        assert_eq!(snapshot.per_responsibility.get(&7), Some(&4));
        assert_eq!(snapshot.per_responsibility.get(&12), Some(&5));
    }

    #[test]
    fn unparsable_count_is_rejected() {
        let result: Result<Vec<UnreadCount>, _> =
            serde_json::from_value(json!([{ "count": "three" }]));
        assert!(result.is_err());
    }

    #[test]
    fn notification_entries_keep_opaque_fields() {
        let entry: NotificationEntry = serde_json::from_value(json!({
            "id": 1,
            "title": "New internal mail",
            "type": "internal",
            "code": "IM-12",
            "sender": { "id": 4 },
            "receiver": null
        }))
        .unwrap();
        assert_eq!(entry.kind.as_deref(), Some("internal"));
        assert_eq!(entry.code, Some(json!("IM-12")));
    }
}
