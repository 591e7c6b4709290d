//! Queued actions and their priority classes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Priority given to action types this build does not know.
pub const UNKNOWN_PRIORITY: i32 = 10;

/// Kinds of state-changing action that can be queued.
///
/// Persisted as `SCREAMING_SNAKE_CASE` strings. Names written by a newer
/// build survive a round trip through [`ActionType::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ActionType {
    /// Emergency alert
    EmergencyAlert,
    /// Check in at a spot
    CheckIn,
    /// Create a new spot
    CreateSpot,
    /// Rate a spot
    SubmitRating,
    /// Comment on a spot
    SubmitComment,
    /// Send a chat message
    SendMessage,
    /// Update the user's profile
    UpdateProfile,
    /// Add or remove a favorite
    ToggleFavorite,
    /// Report content
    SubmitReport,
    /// Unrecognised type name
    Other(String),
}

impl ActionType {
    /// Every known action type, most urgent first.
    pub const KNOWN: [Self; 9] = [
        Self::EmergencyAlert,
        Self::CheckIn,
        Self::CreateSpot,
        Self::SubmitRating,
        Self::SubmitComment,
        Self::SendMessage,
        Self::UpdateProfile,
        Self::ToggleFavorite,
        Self::SubmitReport,
    ];

    /// Wire name of this type.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::EmergencyAlert => "EMERGENCY_ALERT",
            Self::CheckIn => "CHECK_IN",
            Self::CreateSpot => "CREATE_SPOT",
            Self::SubmitRating => "SUBMIT_RATING",
            Self::SubmitComment => "SUBMIT_COMMENT",
            Self::SendMessage => "SEND_MESSAGE",
            Self::UpdateProfile => "UPDATE_PROFILE",
            Self::ToggleFavorite => "TOGGLE_FAVORITE",
            Self::SubmitReport => "SUBMIT_REPORT",
            Self::Other(name) => name,
        }
    }

    /// Priority class (lower = served first).
    #[must_use]
    pub const fn priority(&self) -> i32 {
        match self {
            Self::EmergencyAlert => 0,
            Self::CheckIn => 1,
            Self::CreateSpot => 2,
            Self::SubmitRating => 3,
            Self::SubmitComment => 4,
            Self::SendMessage => 5,
            Self::UpdateProfile => 6,
            Self::ToggleFavorite => 7,
            Self::SubmitReport => 8,
            Self::Other(_) => UNKNOWN_PRIORITY,
        }
    }

    /// Whether this build knows the type.
    #[must_use]
    pub const fn is_known(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

impl From<&str> for ActionType {
    fn from(s: &str) -> Self {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        Self::KNOWN
            .into_iter()
            .find(|known| known.as_str() == normalized)
            .unwrap_or_else(|| Self::Other(s.to_string()))
    }
}

impl From<String> for ActionType {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<ActionType> for String {
    fn from(t: ActionType) -> Self {
        match t {
            ActionType::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of deferred work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedAction {
    /// Unique ID
    pub id: String,
    /// Action kind
    #[serde(rename = "type")]
    pub action_type: ActionType,
    /// Opaque payload handed to the remote operation
    pub data: serde_json::Value,
    /// Priority captured at enqueue time
    pub priority: i32,
    /// Failed attempts so far
    pub retries: u32,
    /// When the action was queued
    pub created_at: DateTime<Utc>,
}

impl QueuedAction {
    /// Create a fresh action with the type's default priority.
    #[must_use]
    pub fn new(action_type: ActionType, data: serde_json::Value, created_at: DateTime<Utc>) -> Self {
        let priority = action_type.priority();
        Self {
            id: new_action_id(),
            action_type,
            data,
            priority,
            retries: 0,
            created_at,
        }
    }

    /// Ordering key: priority, then FIFO.
    #[must_use]
    pub const fn sort_key(&self) -> (i32, DateTime<Utc>) {
        (self.priority, self.created_at)
    }
}

/// Time-ordered unique ID (UUIDv7: millisecond timestamp plus random bits).
#[must_use]
pub fn new_action_id() -> String {
    Uuid::now_v7().to_string()
}

/// Insert `action` after every action that sorts at or before it.
pub fn insert_sorted(actions: &mut Vec<QueuedAction>, action: QueuedAction) {
    let key = action.sort_key();
    let at = actions.partition_point(|a| a.sort_key() <= key);
    actions.insert(at, action);
}

/// Stable sort by `(priority, created_at)`.
pub fn sort_actions(actions: &mut [QueuedAction]) {
    actions.sort_by_key(QueuedAction::sort_key);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap() + Duration::seconds(secs)
    }

    #[test]
    fn test_priority_order() {
        let priorities: Vec<i32> = ActionType::KNOWN.iter().map(ActionType::priority).collect();
        let mut sorted = priorities.clone();
        sorted.sort_unstable();
        assert_eq!(priorities, sorted);
        assert_eq!(ActionType::EmergencyAlert.priority(), 0);
        assert_eq!(ActionType::Other("X".to_string()).priority(), UNKNOWN_PRIORITY);
    }

    #[test]
    fn test_action_type_parsing() {
        assert_eq!(ActionType::from("CHECK_IN"), ActionType::CheckIn);
        assert_eq!(ActionType::from("check-in"), ActionType::CheckIn);
        assert_eq!(ActionType::from("send_message"), ActionType::SendMessage);
        assert_eq!(
            ActionType::from("NEW_FEATURE"),
            ActionType::Other("NEW_FEATURE".to_string())
        );
    }

    #[test]
    fn test_action_type_serde() {
        let json = serde_json::to_string(&ActionType::ToggleFavorite).unwrap();
        assert_eq!(json, "\"TOGGLE_FAVORITE\"");

        let unknown: ActionType = serde_json::from_str("\"LIVE_STREAM\"").unwrap();
        assert_eq!(unknown, ActionType::Other("LIVE_STREAM".to_string()));
        assert_eq!(serde_json::to_string(&unknown).unwrap(), "\"LIVE_STREAM\"");
    }

    #[test]
    fn test_queued_action_wire_format() {
        let action = QueuedAction::new(ActionType::CreateSpot, json!({"name": "Pier"}), at(0));
        let value = serde_json::to_value(&action).unwrap();

        assert_eq!(value["type"], "CREATE_SPOT");
        assert_eq!(value["priority"], 2);
        assert_eq!(value["retries"], 0);
        assert!(value.get("createdAt").is_some());
    }

    #[test]
    fn test_ids_are_unique() {
        let a = QueuedAction::new(ActionType::CheckIn, json!({}), at(0));
        let b = QueuedAction::new(ActionType::CheckIn, json!({}), at(0));
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_insert_sorted_is_fifo_within_priority() {
        let mut actions = Vec::new();
        let first = QueuedAction::new(ActionType::SubmitComment, json!({}), at(1));
        let second = QueuedAction::new(ActionType::SubmitComment, json!({}), at(1));
        let urgent = QueuedAction::new(ActionType::EmergencyAlert, json!({}), at(5));
        let report = QueuedAction::new(ActionType::SubmitReport, json!({}), at(0));

        insert_sorted(&mut actions, report.clone());
        insert_sorted(&mut actions, first.clone());
        insert_sorted(&mut actions, second.clone());
        insert_sorted(&mut actions, urgent.clone());

        let ids: Vec<&str> = actions.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                urgent.id.as_str(),
                first.id.as_str(),
                second.id.as_str(),
                report.id.as_str()
            ]
        );
    }

    #[test]
    fn test_sort_actions_uses_stored_priority() {
        let mut bumped = QueuedAction::new(ActionType::SubmitReport, json!({}), at(3));
        bumped.priority = -1;
        let alert = QueuedAction::new(ActionType::EmergencyAlert, json!({}), at(0));

        let mut actions = vec![alert.clone(), bumped.clone()];
        sort_actions(&mut actions);
        assert_eq!(actions[0].id, bumped.id);
    }
}
