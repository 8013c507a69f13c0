//! Board mutation engine.
//!
//! Every entry point checks authorization first, then runs as one atomic
//! per-board transaction that takes the board from one dense-order state
//! to another; there is no observable in-between state. Outcomes are
//! tagged results (`NotFound` / `Forbidden` / `Invalid` / `Transient`),
//! never panics. `Transient` storage failures are retried a bounded
//! number of times before being surfaced.
//!
//! Successful mutations are published through the `EventPublisher` seam,
//! excluding the originating connection: the originator already applied
//! the change optimistically and gets the canonical result as its direct
//! response.

use chrono::Utc;
use tracing::debug;

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::events::{BoardEvent, EventPublisher, TaskMoved};
use crate::model::{
    ActivityAction, ActivityEntry, Board, BoardId, BoardView, Column, ColumnId, ColumnView, Task,
    TaskDraft, TaskId, TaskPatch, UserId,
};
use crate::model::ConnectionId;
use crate::position;
use crate::storage::{AccessPolicy, BoardStore};

/// Default columns created for a fresh board, name and color.
const DEFAULT_COLUMNS: [(&str, &str); 5] = [
    ("Backlog", "#6b7280"),
    ("Todo", "#3b82f6"),
    ("In Progress", "#f59e0b"),
    ("Review", "#8b5cf6"),
    ("Done", "#10b981"),
];

/// Result of a successful `move_task`.
#[derive(Debug, Clone, PartialEq)]
pub struct MovedTask {
    pub task: Task,
    pub source_column_id: ColumnId,
}

/// The mutation engine. Generic over its three collaborators so tests
/// can swap any of them independently.
pub struct BoardEngine<S, A, P> {
    store: S,
    policy: A,
    publisher: P,
    config: EngineConfig,
}

impl<S, A, P> BoardEngine<S, A, P>
where
    S: BoardStore,
    A: AccessPolicy,
    P: EventPublisher,
{
    pub fn new(store: S, policy: A, publisher: P) -> Self {
        Self::with_config(store, policy, publisher, EngineConfig::default())
    }

    pub fn with_config(store: S, policy: A, publisher: P, config: EngineConfig) -> Self {
        Self {
            store,
            policy,
            publisher,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn authorize(&self, actor: UserId, board: BoardId) -> Result<()> {
        if self.policy.can_write(actor, board) {
            Ok(())
        } else {
            Err(Error::Forbidden(format!(
                "user {actor} may not modify board {board}"
            )))
        }
    }

    /// Retry `op` while it fails transiently, up to the configured budget.
    fn retrying<T>(&self, mut op: impl FnMut() -> Result<T>) -> Result<T> {
        let mut attempts = 0;
        loop {
            match op() {
                Err(err) if err.is_transient() && attempts < self.config.max_transient_retries => {
                    attempts += 1;
                    debug!(attempt = attempts, error = %err, "retrying transient storage failure");
                }
                other => return other,
            }
        }
    }

    // =========================================================================
    // Board lifecycle
    // =========================================================================

    /// Create a board, optionally seeded with the standard column set.
    pub fn create_board(&self, name: &str, default_columns: bool) -> Result<Board> {
        let board = Board {
            id: BoardId::new(),
            name: name.to_string(),
            created_at: Utc::now(),
        };
        let board_id = board.id;
        self.store.insert_board(board.clone())?;
        if default_columns {
            self.retrying(|| {
                self.store.with_board(board_id, |arena| {
                    for (index, (name, color)) in DEFAULT_COLUMNS.iter().enumerate() {
                        arena.columns.push(Column {
                            id: ColumnId::new(),
                            board_id,
                            name: (*name).to_string(),
                            order_index: index as i64,
                            color: Some((*color).to_string()),
                        });
                    }
                    Ok(())
                })
            })?;
        }
        debug!(%board_id, name, "board created");
        Ok(board)
    }

    /// Full board tree for the initial client fetch: columns and tasks
    /// ordered by index.
    pub fn load_board(&self, actor: UserId, board_id: BoardId) -> Result<BoardView> {
        self.authorize(actor, board_id)?;
        self.retrying(|| {
            self.store.read_board(board_id, |arena| {
                let board = arena
                    .board
                    .clone()
                    .ok_or_else(|| Error::not_found("board", board_id))?;
                let mut columns = arena.columns.clone();
                position::sort_by_index(&mut columns);
                let views = columns
                    .into_iter()
                    .map(|column| {
                        let tasks = arena
                            .tasks_in(column.id)
                            .into_iter()
                            .cloned()
                            .collect();
                        ColumnView::from_column(column, tasks)
                    })
                    .collect();
                Ok(BoardView {
                    id: board.id,
                    name: board.name,
                    created_at: board.created_at,
                    columns: views,
                })
            })?
        })
    }

    // =========================================================================
    // Task mutations
    // =========================================================================

    /// Move a task to `target_column` at `target_index`, shifting
    /// neighbors on both sides in the same atomic step. Cross-column
    /// moves record a "Moved" activity entry.
    pub fn move_task(
        &self,
        actor: UserId,
        origin: Option<&ConnectionId>,
        task_id: TaskId,
        target_column: ColumnId,
        target_index: i64,
    ) -> Result<MovedTask> {
        let board_id = self.store.board_of_task(task_id)?;
        self.authorize(actor, board_id)?;

        let (moved, changed) = self.retrying(|| {
            self.store.with_board(board_id, |arena| {
                let task = arena
                    .task(task_id)
                    .ok_or_else(|| Error::not_found("task", task_id))?;
                let source_column = task.column_id;
                let old_index = task.order_index;

                let source_name = arena
                    .column(source_column)
                    .map(|column| column.name.clone())
                    .ok_or_else(|| Error::not_found("column", source_column))?;
                let target_name = arena
                    .column(target_column)
                    .map(|column| column.name.clone())
                    .ok_or_else(|| Error::not_found("column", target_column))?;

                // Valid slots run 0..=count for a cross-column insert and
                // 0..count for a same-column shuffle; clamping past the
                // end means "append" and keeps the order dense.
                let same_column = source_column == target_column;
                let slot_count = if same_column {
                    arena.task_count(target_column).saturating_sub(1)
                } else {
                    arena.task_count(target_column)
                };
                let new_index = position::clamp_target(slot_count, target_index);

                if same_column && old_index == new_index {
                    let task = task.clone();
                    return Ok((
                        MovedTask {
                            task,
                            source_column_id: source_column,
                        },
                        false,
                    ));
                }

                position::close_gap(arena.tasks_in_mut(source_column), old_index);
                position::open_slot(arena.tasks_in_mut(target_column), new_index);

                let task = arena
                    .task_mut(task_id)
                    .ok_or_else(|| Error::not_found("task", task_id))?;
                task.column_id = target_column;
                task.order_index = new_index;
                task.updated_at = Some(Utc::now());
                let task = task.clone();

                if !same_column {
                    arena.activity.push(
                        ActivityEntry::new(task_id, actor, ActivityAction::Moved).with_details(
                            format!("Moved from \"{source_name}\" to \"{target_name}\""),
                        ),
                    );
                }

                Ok((
                    MovedTask {
                        task,
                        source_column_id: source_column,
                    },
                    true,
                ))
            })
        })?;

        if changed {
            debug!(%task_id, %board_id, %target_column, index = moved.task.order_index, "task moved");
            self.publisher.publish(
                board_id,
                BoardEvent::TaskMoved(TaskMoved {
                    task_id,
                    source_column_id: moved.source_column_id,
                    target_column_id: target_column,
                    new_order_index: moved.task.order_index,
                }),
                origin,
            );
        }
        Ok(moved)
    }

    /// Create a task at the end of a column.
    pub fn create_task(
        &self,
        actor: UserId,
        origin: Option<&ConnectionId>,
        column_id: ColumnId,
        draft: TaskDraft,
    ) -> Result<Task> {
        let board_id = self.store.board_of_column(column_id)?;
        self.authorize(actor, board_id)?;

        let task = self.retrying(|| {
            let draft = draft.clone();
            self.store.with_board(board_id, |arena| {
                if arena.column(column_id).is_none() {
                    return Err(Error::not_found("column", column_id));
                }
                if draft.title.trim().is_empty() {
                    return Err(Error::Invalid("task title must not be empty".to_string()));
                }
                let index = arena.task_count(column_id) as i64;
                let task = Task::from_draft(column_id, index, draft);
                arena.activity.push(
                    ActivityEntry::new(task.id, actor, ActivityAction::Created)
                        .with_details(format!("Task \"{}\" was created", task.title)),
                );
                arena.tasks.push(task.clone());
                Ok(task)
            })
        })?;

        debug!(task_id = %task.id, %board_id, %column_id, "task created");
        self.publisher
            .publish(board_id, BoardEvent::TaskCreated(task.clone()), origin);
        Ok(task)
    }

    /// Patch task fields. Positions are untouched; field changes are
    /// summarized in an "Updated" activity entry.
    pub fn update_task(
        &self,
        actor: UserId,
        origin: Option<&ConnectionId>,
        task_id: TaskId,
        patch: &TaskPatch,
    ) -> Result<Task> {
        let board_id = self.store.board_of_task(task_id)?;
        self.authorize(actor, board_id)?;

        let task = self.retrying(|| {
            self.store.with_board(board_id, |arena| {
                let task = arena
                    .task_mut(task_id)
                    .ok_or_else(|| Error::not_found("task", task_id))?;

                let mut changes = Vec::new();
                if let Some(title) = &patch.title {
                    if title.trim().is_empty() {
                        return Err(Error::Invalid("task title must not be empty".to_string()));
                    }
                    if *title != task.title {
                        changes.push(format!(
                            "Title changed from \"{}\" to \"{}\"",
                            task.title, title
                        ));
                        task.title = title.clone();
                    }
                }
                if let Some(description) = &patch.description {
                    task.description = Some(description.clone());
                    changes.push("Description updated".to_string());
                }
                if let Some(priority) = patch.priority {
                    if priority != task.priority {
                        changes.push(format!(
                            "Priority changed from {} to {}",
                            task.priority, priority
                        ));
                        task.priority = priority;
                    }
                }
                if let Some(assignee) = patch.assignee_id {
                    task.assignee_id = Some(assignee);
                }
                if let Some(due_date) = patch.due_date {
                    task.due_date = Some(due_date);
                }
                if let Some(points) = patch.story_points {
                    task.story_points = Some(points);
                }
                task.updated_at = Some(Utc::now());
                let task = task.clone();

                if !changes.is_empty() {
                    arena.activity.push(
                        ActivityEntry::new(task_id, actor, ActivityAction::Updated)
                            .with_details(changes.join("; ")),
                    );
                }
                Ok(task)
            })
        })?;

        debug!(%task_id, %board_id, "task updated");
        self.publisher
            .publish(board_id, BoardEvent::TaskUpdated(task.clone()), origin);
        Ok(task)
    }

    /// Delete a task and close the gap in its column.
    pub fn delete_task(
        &self,
        actor: UserId,
        origin: Option<&ConnectionId>,
        task_id: TaskId,
    ) -> Result<()> {
        let board_id = self.store.board_of_task(task_id)?;
        self.authorize(actor, board_id)?;

        self.retrying(|| {
            self.store.with_board(board_id, |arena| {
                let task = arena
                    .task(task_id)
                    .ok_or_else(|| Error::not_found("task", task_id))?;
                let column_id = task.column_id;
                let removed_index = task.order_index;
                arena.tasks.retain(|task| task.id != task_id);
                position::close_gap(arena.tasks_in_mut(column_id), removed_index);
                Ok(())
            })
        })?;

        debug!(%task_id, %board_id, "task deleted");
        self.publisher
            .publish(board_id, BoardEvent::TaskDeleted(task_id), origin);
        Ok(())
    }

    /// Activity entries for one task, newest first.
    pub fn activity(&self, actor: UserId, task_id: TaskId) -> Result<Vec<ActivityEntry>> {
        let board_id = self.store.board_of_task(task_id)?;
        self.authorize(actor, board_id)?;
        self.store.read_board(board_id, |arena| {
            let mut entries: Vec<ActivityEntry> = arena
                .activity
                .iter()
                .filter(|entry| entry.task_id == task_id)
                .cloned()
                .collect();
            entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            entries
        })
    }

    // =========================================================================
    // Column mutations
    // =========================================================================

    /// Create a column at the end of the board's order.
    pub fn create_column(
        &self,
        actor: UserId,
        origin: Option<&ConnectionId>,
        board_id: BoardId,
        name: &str,
        color: Option<String>,
    ) -> Result<Column> {
        self.authorize(actor, board_id)?;

        let column = self.retrying(|| {
            let color = color.clone();
            self.store.with_board(board_id, |arena| {
                if name.trim().is_empty() {
                    return Err(Error::Invalid("column name must not be empty".to_string()));
                }
                let column = Column {
                    id: ColumnId::new(),
                    board_id,
                    name: name.to_string(),
                    order_index: arena.columns.len() as i64,
                    color,
                };
                arena.columns.push(column.clone());
                Ok(column)
            })
        })?;

        debug!(column_id = %column.id, %board_id, "column created");
        self.publisher
            .publish(board_id, BoardEvent::ColumnCreated(column.clone()), origin);
        Ok(column)
    }

    /// Patch a column's name and/or color. Positions are untouched.
    pub fn update_column(
        &self,
        actor: UserId,
        origin: Option<&ConnectionId>,
        column_id: ColumnId,
        name: Option<&str>,
        color: Option<String>,
    ) -> Result<Column> {
        let board_id = self.store.board_of_column(column_id)?;
        self.authorize(actor, board_id)?;

        let column = self.retrying(|| {
            let color = color.clone();
            self.store.with_board(board_id, |arena| {
                let column = arena
                    .column_mut(column_id)
                    .ok_or_else(|| Error::not_found("column", column_id))?;
                if let Some(name) = name {
                    if name.trim().is_empty() {
                        return Err(Error::Invalid("column name must not be empty".to_string()));
                    }
                    column.name = name.to_string();
                }
                if let Some(color) = color {
                    column.color = Some(color);
                }
                Ok(column.clone())
            })
        })?;

        debug!(%column_id, %board_id, "column updated");
        self.publisher
            .publish(board_id, BoardEvent::ColumnUpdated(column.clone()), origin);
        Ok(column)
    }

    /// Reassign board column order from an explicit full ordering.
    /// All-or-nothing: one id outside the board rejects the whole batch.
    pub fn reorder_columns(
        &self,
        actor: UserId,
        origin: Option<&ConnectionId>,
        board_id: BoardId,
        order: &[ColumnId],
    ) -> Result<()> {
        self.authorize(actor, board_id)?;

        self.retrying(|| {
            self.store.with_board(board_id, |arena| {
                if order.is_empty() {
                    return Err(Error::Invalid("empty column order".to_string()));
                }
                position::reindex(&mut arena.columns, order, |column| column.id)
                    .map_err(|id| Error::not_found("column", id))?;
                Ok(())
            })
        })?;

        debug!(%board_id, count = order.len(), "columns reordered");
        self.publisher.publish(
            board_id,
            BoardEvent::ColumnsReordered(order.to_vec()),
            origin,
        );
        Ok(())
    }

    /// Delete a column with its tasks, closing the gap in the board's
    /// column order.
    pub fn delete_column(
        &self,
        actor: UserId,
        origin: Option<&ConnectionId>,
        column_id: ColumnId,
    ) -> Result<()> {
        let board_id = self.store.board_of_column(column_id)?;
        self.authorize(actor, board_id)?;

        self.retrying(|| {
            self.store.with_board(board_id, |arena| {
                let column = arena
                    .column(column_id)
                    .ok_or_else(|| Error::not_found("column", column_id))?;
                let removed_index = column.order_index;
                arena.columns.retain(|column| column.id != column_id);
                arena.tasks.retain(|task| task.column_id != column_id);
                position::close_gap(arena.columns.iter_mut(), removed_index);
                Ok(())
            })
        })?;

        debug!(%column_id, %board_id, "column deleted");
        self.publisher
            .publish(board_id, BoardEvent::ColumnDeleted(column_id), origin);
        Ok(())
    }
}
