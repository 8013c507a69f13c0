//! Domain model for liveboard.
//!
//! Entities are arena-friendly: parent/child relationships are expressed
//! as explicit id fields (a task knows its column id, a column its board
//! id) and resolved through the storage layer, never through embedded
//! object graphs with back-references.
//!
//! Serialized field names are camelCase to stay wire-compatible with the
//! existing board clients (`orderIndex`, `columnId`, ...).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a fresh random id.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }
    };
}

uuid_id!(
    /// Identifier of a board.
    BoardId
);
uuid_id!(
    /// Identifier of a column within a board.
    ColumnId
);
uuid_id!(
    /// Identifier of a task within a column.
    TaskId
);
uuid_id!(
    /// Identifier of an authenticated user.
    UserId
);

/// Identifier of one live hub connection. Assigned by the transport at
/// connect time; opaque to everything else.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    /// Generate a fresh random connection id.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for ConnectionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Task priority levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Priority::Low => "Low",
            Priority::Medium => "Medium",
            Priority::High => "High",
            Priority::Critical => "Critical",
        };
        f.write_str(name)
    }
}

/// A board: a named, ordered collection of columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Board {
    pub id: BoardId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// A column within a board. `order_index` is the column's place in the
/// board's total order: within one board the indices are always the dense
/// sequence `0..N-1` between mutations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub id: ColumnId,
    pub board_id: BoardId,
    pub name: String,
    pub order_index: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// A short label attached to tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Label {
    pub id: Uuid,
    pub name: String,
    pub color: String,
}

/// A task within a column. Belongs to exactly one column at a time;
/// `order_index` obeys the same dense-sequence invariant as columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub column_id: ColumnId,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub priority: Priority,
    pub order_index: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub story_points: Option<i32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<Label>,
    #[serde(default)]
    pub comment_count: usize,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Build a new task from a draft, placed in `column_id` at `order_index`.
    pub fn from_draft(column_id: ColumnId, order_index: i64, draft: TaskDraft) -> Self {
        Self {
            id: TaskId::new(),
            column_id,
            title: draft.title,
            description: draft.description,
            priority: draft.priority,
            order_index,
            assignee_id: draft.assignee_id,
            due_date: draft.due_date,
            story_points: draft.story_points,
            labels: Vec::new(),
            comment_count: 0,
            created_at: Utc::now(),
            updated_at: None,
        }
    }
}

/// Fields supplied when creating a task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDraft {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub story_points: Option<i32>,
}

impl TaskDraft {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

/// Field patch applied by task updates. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub story_points: Option<i32>,
}

/// Kinds of recorded task activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivityAction {
    Created,
    Updated,
    Moved,
}

/// One entry in a task's activity log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    pub id: String,
    pub task_id: TaskId,
    pub user_id: UserId,
    pub action: ActivityAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ActivityEntry {
    /// Record an action by `user_id` against `task_id`.
    pub fn new(task_id: TaskId, user_id: UserId, action: ActivityAction) -> Self {
        Self {
            id: Ulid::new().to_string(),
            task_id,
            user_id,
            action,
            details: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Full board tree as fetched by a client: columns ordered by index,
/// each carrying its tasks ordered by index. Also the shape the client
/// mirror mutates locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardView {
    pub id: BoardId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub columns: Vec<ColumnView>,
}

impl BoardView {
    pub fn column(&self, id: ColumnId) -> Option<&ColumnView> {
        self.columns.iter().find(|column| column.id == id)
    }

    pub fn column_mut(&mut self, id: ColumnId) -> Option<&mut ColumnView> {
        self.columns.iter_mut().find(|column| column.id == id)
    }

    /// Locate a task anywhere in the tree, with its column id.
    pub fn find_task(&self, id: TaskId) -> Option<(ColumnId, &Task)> {
        self.columns.iter().find_map(|column| {
            column
                .tasks
                .iter()
                .find(|task| task.id == id)
                .map(|task| (column.id, task))
        })
    }
}

/// One column in a `BoardView`, with its task list inline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnView {
    pub id: ColumnId,
    pub board_id: BoardId,
    pub name: String,
    pub order_index: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    pub tasks: Vec<Task>,
}

impl ColumnView {
    pub fn from_column(column: Column, tasks: Vec<Task>) -> Self {
        Self {
            id: column.id,
            board_id: column.board_id,
            name: column.name,
            order_index: column.order_index,
            color: column.color,
            tasks,
        }
    }
}

/// Transient record of a user viewing a board through one connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPresence {
    pub user_id: UserId,
    pub user_name: String,
    pub connected_at: DateTime<Utc>,
}
