//! Field tasks scheduled against batches and zones

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::types::ParseEnumError;

/// Days ahead covered by the upcoming task list
pub const UPCOMING_TASK_DAYS: i64 = 7;

/// Kind of work a task asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    Measurement,
    StageTransition,
    Maintenance,
    Inspection,
}

impl TaskType {
    pub const ALL: [TaskType; 4] = [
        TaskType::Measurement,
        TaskType::StageTransition,
        TaskType::Maintenance,
        TaskType::Inspection,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Measurement => "MEASUREMENT",
            TaskType::StageTransition => "STAGE_TRANSITION",
            TaskType::Maintenance => "MAINTENANCE",
            TaskType::Inspection => "INSPECTION",
        }
    }
}

impl FromStr for TaskType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ParseEnumError::new("task type", s))
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Urgency derived from the time left until a task is due
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskPriority {
    Urgent,
    High,
    Medium,
    Low,
}

impl TaskPriority {
    /// Overdue is urgent, then under a day high, under three days medium
    pub fn for_due(due_date: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        let hours = (due_date - now).num_hours();
        if due_date < now {
            TaskPriority::Urgent
        } else if hours < 24 {
            TaskPriority::High
        } else if hours < 72 {
            TaskPriority::Medium
        } else {
            TaskPriority::Low
        }
    }
}

/// A unit of field work assigned to one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    /// Assignee
    pub user_id: Uuid,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub title: String,
    pub description: Option<String>,
    pub due_date: DateTime<Utc>,
    pub is_completed: bool,
    pub batch_id: Option<Uuid>,
    pub zone_id: Option<Uuid>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn priority(&self, now: DateTime<Utc>) -> TaskPriority {
        TaskPriority::for_due(self.due_date, now)
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        !self.is_completed && self.due_date < now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_priority_bands() {
        let now = Utc::now();
        assert_eq!(
            TaskPriority::for_due(now - Duration::minutes(1), now),
            TaskPriority::Urgent
        );
        assert_eq!(
            TaskPriority::for_due(now + Duration::hours(23), now),
            TaskPriority::High
        );
        assert_eq!(
            TaskPriority::for_due(now + Duration::hours(24), now),
            TaskPriority::Medium
        );
        assert_eq!(
            TaskPriority::for_due(now + Duration::hours(71), now),
            TaskPriority::Medium
        );
        assert_eq!(
            TaskPriority::for_due(now + Duration::hours(72), now),
            TaskPriority::Low
        );
    }

    #[test]
    fn test_completed_task_is_never_overdue() {
        let now = Utc::now();
        let mut task = Task {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            task_type: TaskType::Inspection,
            title: "Check irrigation".to_string(),
            description: None,
            due_date: now - Duration::days(1),
            is_completed: false,
            batch_id: None,
            zone_id: None,
            created_by: Uuid::new_v4(),
            created_at: now - Duration::days(3),
            completed_at: None,
        };
        assert!(task.is_overdue(now));
        assert_eq!(task.priority(now), TaskPriority::Urgent);

        task.is_completed = true;
        assert!(!task.is_overdue(now));
    }

    #[test]
    fn test_task_type_parsing() {
        for task_type in TaskType::ALL {
            assert_eq!(task_type.as_str().parse::<TaskType>().unwrap(), task_type);
        }
        assert!("WATERING".parse::<TaskType>().is_err());
    }

    #[test]
    fn test_task_type_serializes_under_type_key() {
        let json = serde_json::json!({ "type": TaskType::StageTransition });
        assert_eq!(json["type"], "STAGE_TRANSITION");
    }
}
