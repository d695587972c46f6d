//! Field task scheduling

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use shared::{Action, Actor, DateRange, Resource, Task, TaskType, UPCOMING_TASK_DAYS};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::services::authorize;
use crate::store::{NurseryStore, TaskFilter};

/// Assigns, completes and lists field tasks
#[derive(Clone)]
pub struct TaskService {
    store: Arc<dyn NurseryStore>,
}

/// Input for creating a task
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateTaskInput {
    /// Assignee
    pub user_id: Uuid,
    pub task_type: TaskType,
    #[validate(length(min = 1, max = 200, message = "Title must be 1 to 200 characters"))]
    pub title: String,
    #[validate(length(max = 2000, message = "Description must be at most 2000 characters"))]
    pub description: Option<String>,
    pub due_date: DateTime<Utc>,
    pub batch_id: Option<Uuid>,
    pub zone_id: Option<Uuid>,
}

impl TaskService {
    /// Create a new TaskService instance
    pub fn new(store: Arc<dyn NurseryStore>) -> Self {
        Self { store }
    }

    pub async fn create_task(&self, actor: &Actor, input: CreateTaskInput) -> AppResult<Task> {
        authorize(actor, Resource::Task, Action::Create)?;
        input.validate()?;
        let title = input.title.trim().to_string();
        if title.is_empty() {
            return Err(AppError::validation("title", "Title must not be blank"));
        }

        if let Some(batch_id) = input.batch_id {
            if self.store.get_batch(batch_id).await?.is_none() {
                return Err(AppError::validation("batch_id", "Batch not found"));
            }
        }
        if let Some(zone_id) = input.zone_id {
            if self.store.get_zone(zone_id).await?.is_none() {
                return Err(AppError::validation("zone_id", "Zone not found"));
            }
        }

        let task = Task {
            id: Uuid::new_v4(),
            user_id: input.user_id,
            task_type: input.task_type,
            title,
            description: input.description,
            due_date: input.due_date,
            is_completed: false,
            batch_id: input.batch_id,
            zone_id: input.zone_id,
            created_by: actor.user_id,
            created_at: Utc::now(),
            completed_at: None,
        };
        self.store.insert_task(&task).await?;

        tracing::info!(
            task_id = %task.id,
            task_type = task.task_type.as_str(),
            assignee = %task.user_id,
            due_date = %task.due_date,
            "task created"
        );
        Ok(task)
    }

    pub async fn get_task(&self, actor: &Actor, task_id: Uuid) -> AppResult<Task> {
        authorize(actor, Resource::Task, Action::View)?;
        self.load(task_id).await
    }

    /// Mark a task done. The assignee may always complete their own task.
    pub async fn complete_task(&self, actor: &Actor, task_id: Uuid) -> AppResult<Task> {
        let task = self.load(task_id).await?;
        if task.user_id != actor.user_id {
            authorize(actor, Resource::Task, Action::Edit)?;
        }

        let task = self.store.complete_task(task_id, Utc::now()).await?;
        tracing::info!(
            task_id = %task.id,
            completed_by = %actor.user_id,
            "task completed"
        );
        Ok(task)
    }

    pub async fn delete_task(&self, actor: &Actor, task_id: Uuid) -> AppResult<()> {
        authorize(actor, Resource::Task, Action::Delete)?;
        self.store.delete_task(task_id).await?;
        tracing::info!(task_id = %task_id, "task deleted");
        Ok(())
    }

    /// Filtered tasks, earliest due first
    pub async fn list_tasks(&self, actor: &Actor, filter: &TaskFilter) -> AppResult<Vec<Task>> {
        authorize(actor, Resource::Task, Action::View)?;
        self.store.list_tasks(filter).await
    }

    /// Tasks due on the days of `range`, optionally of one type
    pub async fn schedule(
        &self,
        actor: &Actor,
        range: DateRange,
        task_type: Option<TaskType>,
    ) -> AppResult<Vec<Task>> {
        authorize(actor, Resource::Task, Action::View)?;
        if range.start > range.end {
            return Err(AppError::validation(
                "date_range",
                "Start date must not be after end date",
            ));
        }
        let filter = TaskFilter {
            task_type,
            due_on: Some(range),
            ..Default::default()
        };
        self.store.list_tasks(&filter).await
    }

    /// Pending tasks due within the coming week, optionally for one assignee
    pub async fn upcoming(&self, actor: &Actor, user_id: Option<Uuid>) -> AppResult<Vec<Task>> {
        authorize(actor, Resource::Task, Action::View)?;
        let now = Utc::now();
        let filter = TaskFilter {
            completed: Some(false),
            user_id,
            due_from: Some(now),
            due_to: Some(now + Duration::days(UPCOMING_TASK_DAYS)),
            ..Default::default()
        };
        self.store.list_tasks(&filter).await
    }

    async fn load(&self, task_id: Uuid) -> AppResult<Task> {
        self.store
            .get_task(task_id)
            .await?
            .ok_or_else(|| AppError::not_found("task", task_id))
    }
}
