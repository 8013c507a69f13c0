//! Broadcast events fanned out to board viewers.
//!
//! The variants and payload shapes are the wire contract with existing
//! clients: the tag is the event method name (`TaskMoved`, `UserJoined`,
//! ...) and the payload nests exactly as listed, so field names must not
//! change.

use serde::{Deserialize, Serialize};

use crate::model::{BoardId, Column, ColumnId, ConnectionId, Task, TaskId, UserId, UserPresence};

/// Fan-out seam between the mutation engine and the live hub. `exclude`
/// names the originating connection, which already has the result of its
/// own request.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, board: BoardId, event: BoardEvent, exclude: Option<&ConnectionId>);
}

/// Publisher that drops every event. For engines without live viewers.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPublisher;

impl EventPublisher for NoopPublisher {
    fn publish(&self, _board: BoardId, _event: BoardEvent, _exclude: Option<&ConnectionId>) {}
}

impl<P: EventPublisher> EventPublisher for std::sync::Arc<P> {
    fn publish(&self, board: BoardId, event: BoardEvent, exclude: Option<&ConnectionId>) {
        (**self).publish(board, event, exclude);
    }
}

/// Payload of a `TaskMoved` broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskMoved {
    pub task_id: TaskId,
    pub source_column_id: ColumnId,
    pub target_column_id: ColumnId,
    pub new_order_index: i64,
}

/// One event delivered to every connection viewing a board (minus the
/// originator, for mutation events).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum BoardEvent {
    TaskMoved(TaskMoved),
    TaskCreated(Task),
    TaskUpdated(Task),
    TaskDeleted(TaskId),
    ColumnCreated(Column),
    ColumnUpdated(Column),
    ColumnsReordered(Vec<ColumnId>),
    ColumnDeleted(ColumnId),
    #[serde(rename_all = "camelCase")]
    UserJoined {
        user_id: UserId,
        user_name: String,
    },
    UserLeft(UserId),
    CurrentUsers(Vec<UserPresence>),
}

impl BoardEvent {
    /// The wire method name, used for logging.
    pub fn name(&self) -> &'static str {
        match self {
            BoardEvent::TaskMoved(_) => "TaskMoved",
            BoardEvent::TaskCreated(_) => "TaskCreated",
            BoardEvent::TaskUpdated(_) => "TaskUpdated",
            BoardEvent::TaskDeleted(_) => "TaskDeleted",
            BoardEvent::ColumnCreated(_) => "ColumnCreated",
            BoardEvent::ColumnUpdated(_) => "ColumnUpdated",
            BoardEvent::ColumnsReordered(_) => "ColumnsReordered",
            BoardEvent::ColumnDeleted(_) => "ColumnDeleted",
            BoardEvent::UserJoined { .. } => "UserJoined",
            BoardEvent::UserLeft(_) => "UserLeft",
            BoardEvent::CurrentUsers(_) => "CurrentUsers",
        }
    }

    /// True for the presence events (`UserJoined`, `UserLeft`,
    /// `CurrentUsers`); everything else describes a board mutation.
    pub fn is_presence(&self) -> bool {
        matches!(
            self,
            BoardEvent::UserJoined { .. } | BoardEvent::UserLeft(_) | BoardEvent::CurrentUsers(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_moved_wire_shape() {
        let event = BoardEvent::TaskMoved(TaskMoved {
            task_id: TaskId::new(),
            source_column_id: ColumnId::new(),
            target_column_id: ColumnId::new(),
            new_order_index: 4,
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "TaskMoved");
        assert!(json["data"].get("taskId").is_some());
        assert!(json["data"].get("sourceColumnId").is_some());
        assert!(json["data"].get("targetColumnId").is_some());
        assert_eq!(json["data"]["newOrderIndex"], 4);
    }

    #[test]
    fn test_bare_payload_events() {
        let task_id = TaskId::new();
        let json = serde_json::to_value(BoardEvent::TaskDeleted(task_id)).unwrap();
        assert_eq!(json["event"], "TaskDeleted");
        assert_eq!(json["data"], serde_json::json!(task_id.to_string()));

        let ids = vec![ColumnId::new(), ColumnId::new()];
        let json = serde_json::to_value(BoardEvent::ColumnsReordered(ids.clone())).unwrap();
        assert!(json["data"].is_array());
        assert_eq!(json["data"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_user_joined_shape() {
        let event = BoardEvent::UserJoined {
            user_id: UserId::new(),
            user_name: "Dana".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["data"]["userName"], "Dana");
        assert!(json["data"].get("userId").is_some());
    }

    #[test]
    fn test_roundtrip() {
        let event = BoardEvent::ColumnDeleted(ColumnId::new());
        let json = serde_json::to_string(&event).unwrap();
        let back: BoardEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_presence_classification() {
        assert!(BoardEvent::UserLeft(UserId::new()).is_presence());
        assert!(BoardEvent::CurrentUsers(Vec::new()).is_presence());
        assert!(!BoardEvent::TaskDeleted(TaskId::new()).is_presence());
    }
}
