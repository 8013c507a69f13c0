//! Client-side board mirror.
//!
//! Holds one board's entity tree for the lifetime of a viewing session.
//! Local commands splice the tree immediately (optimistic apply), then
//! issue the corresponding engine request through a `CommandSink`; a
//! rejection restores the pre-command snapshot exactly and surfaces the
//! error. Broadcast events from the hub are merged through the same
//! pure reducer (`apply_event`), so the optimistic path and the remote
//! path cannot drift in behavior.
//!
//! Events describe completed server-side transitions; delivery order
//! across unrelated operations is not guaranteed, so an event that
//! references ids the mirror no longer knows is ignored, never an
//! error. The mirror tolerates outright event loss too: `refresh`
//! replaces the tree wholesale from an authoritative fetch.

use tracing::debug;

use crate::engine::MovedTask;
use crate::error::{Error, Result};
use crate::events::BoardEvent;
use crate::model::{
    BoardId, BoardView, Column, ColumnId, ColumnView, ConnectionId, Task, TaskDraft, TaskId,
    TaskPatch, UserId, UserPresence,
};
use crate::position;

/// The client's request channel to the mutation engine. Implementations
/// wrap whatever transport carries commands; results are the engine's
/// canonical outcomes.
pub trait CommandSink {
    fn fetch_board(&self, board: BoardId) -> Result<BoardView>;
    fn move_task(&self, task: TaskId, target_column: ColumnId, target_index: i64)
        -> Result<MovedTask>;
    fn create_task(&self, column: ColumnId, draft: TaskDraft) -> Result<Task>;
    fn update_task(&self, task: TaskId, patch: &TaskPatch) -> Result<Task>;
    fn delete_task(&self, task: TaskId) -> Result<()>;
    fn create_column(&self, board: BoardId, name: &str, color: Option<String>) -> Result<Column>;
    fn update_column(&self, column: ColumnId, name: Option<&str>, color: Option<String>)
        -> Result<Column>;
    fn delete_column(&self, column: ColumnId) -> Result<()>;
    fn reorder_columns(&self, board: BoardId, order: &[ColumnId]) -> Result<()>;
}

/// In-process sink binding an engine to one actor and one originating
/// connection, so the engine's broadcasts exclude that connection.
pub struct EngineSink<'a, S, A, P> {
    engine: &'a crate::engine::BoardEngine<S, A, P>,
    actor: UserId,
    origin: ConnectionId,
}

impl<'a, S, A, P> EngineSink<'a, S, A, P> {
    pub fn new(
        engine: &'a crate::engine::BoardEngine<S, A, P>,
        actor: UserId,
        origin: ConnectionId,
    ) -> Self {
        Self {
            engine,
            actor,
            origin,
        }
    }
}

impl<S, A, P> CommandSink for EngineSink<'_, S, A, P>
where
    S: crate::storage::BoardStore,
    A: crate::storage::AccessPolicy,
    P: crate::events::EventPublisher,
{
    fn fetch_board(&self, board: BoardId) -> Result<BoardView> {
        self.engine.load_board(self.actor, board)
    }
    fn move_task(
        &self,
        task: TaskId,
        target_column: ColumnId,
        target_index: i64,
    ) -> Result<MovedTask> {
        self.engine
            .move_task(self.actor, Some(&self.origin), task, target_column, target_index)
    }
    fn create_task(&self, column: ColumnId, draft: TaskDraft) -> Result<Task> {
        self.engine
            .create_task(self.actor, Some(&self.origin), column, draft)
    }
    fn update_task(&self, task: TaskId, patch: &TaskPatch) -> Result<Task> {
        self.engine
            .update_task(self.actor, Some(&self.origin), task, patch)
    }
    fn delete_task(&self, task: TaskId) -> Result<()> {
        self.engine.delete_task(self.actor, Some(&self.origin), task)
    }
    fn create_column(&self, board: BoardId, name: &str, color: Option<String>) -> Result<Column> {
        self.engine
            .create_column(self.actor, Some(&self.origin), board, name, color)
    }
    fn update_column(
        &self,
        column: ColumnId,
        name: Option<&str>,
        color: Option<String>,
    ) -> Result<Column> {
        self.engine
            .update_column(self.actor, Some(&self.origin), column, name, color)
    }
    fn delete_column(&self, column: ColumnId) -> Result<()> {
        self.engine
            .delete_column(self.actor, Some(&self.origin), column)
    }
    fn reorder_columns(&self, board: BoardId, order: &[ColumnId]) -> Result<()> {
        self.engine
            .reorder_columns(self.actor, Some(&self.origin), board, order)
    }
}

/// Reassign each task's order index to its slot in the list.
fn renumber_tasks(tasks: &mut [Task]) {
    for (index, task) in tasks.iter_mut().enumerate() {
        task.order_index = index as i64;
    }
}

/// Reassign each column's order index to its slot in the list.
fn renumber_columns(columns: &mut [ColumnView]) {
    for (index, column) in columns.iter_mut().enumerate() {
        column.order_index = index as i64;
    }
}

/// Remove a task from wherever the tree currently holds it, renumbering
/// the column it left.
fn take_task(view: &mut BoardView, id: TaskId) -> Option<Task> {
    for column in &mut view.columns {
        if let Some(slot) = column.tasks.iter().position(|task| task.id == id) {
            let task = column.tasks.remove(slot);
            renumber_tasks(&mut column.tasks);
            return Some(task);
        }
    }
    None
}

/// Pure reducer: merge one completed server-side transition into the
/// tree. Ids the tree does not know are ignored. Presence events do not
/// touch the tree.
pub fn apply_event(view: &mut BoardView, event: &BoardEvent) {
    match event {
        BoardEvent::TaskMoved(moved) => {
            let Some(mut task) = take_task(view, moved.task_id) else {
                return;
            };
            let Some(column) = view.column_mut(moved.target_column_id) else {
                // Target unknown here; the next refresh restores it.
                return;
            };
            let slot = position::clamp_target(column.tasks.len(), moved.new_order_index) as usize;
            task.column_id = moved.target_column_id;
            column.tasks.insert(slot, task);
            renumber_tasks(&mut column.tasks);
        }
        BoardEvent::TaskCreated(task) => {
            if view.find_task(task.id).is_some() {
                return;
            }
            let Some(column) = view.column_mut(task.column_id) else {
                return;
            };
            let slot = position::clamp_target(column.tasks.len(), task.order_index) as usize;
            column.tasks.insert(slot, task.clone());
            renumber_tasks(&mut column.tasks);
        }
        BoardEvent::TaskUpdated(task) => {
            for column in &mut view.columns {
                if let Some(existing) = column.tasks.iter_mut().find(|t| t.id == task.id) {
                    let index = existing.order_index;
                    let column_id = existing.column_id;
                    *existing = task.clone();
                    // Keep the local slot; position changes arrive as
                    // TaskMoved, not TaskUpdated.
                    existing.order_index = index;
                    existing.column_id = column_id;
                    return;
                }
            }
        }
        BoardEvent::TaskDeleted(id) => {
            take_task(view, *id);
        }
        BoardEvent::ColumnCreated(column) => {
            if view.column(column.id).is_some() {
                return;
            }
            let slot = position::clamp_target(view.columns.len(), column.order_index) as usize;
            view.columns
                .insert(slot, ColumnView::from_column(column.clone(), Vec::new()));
            renumber_columns(&mut view.columns);
        }
        BoardEvent::ColumnUpdated(column) => {
            if let Some(existing) = view.column_mut(column.id) {
                existing.name = column.name.clone();
                existing.color = column.color.clone();
            }
        }
        BoardEvent::ColumnsReordered(order) => {
            let known: Vec<ColumnId> = order
                .iter()
                .copied()
                .filter(|id| view.column(*id).is_some())
                .collect();
            if position::reindex(&mut view.columns, &known, |column| column.id).is_ok() {
                position::sort_by_index(&mut view.columns);
                renumber_columns(&mut view.columns);
            }
        }
        BoardEvent::ColumnDeleted(id) => {
            view.columns.retain(|column| column.id != *id);
            renumber_columns(&mut view.columns);
        }
        BoardEvent::UserJoined { .. } | BoardEvent::UserLeft(_) | BoardEvent::CurrentUsers(_) => {}
    }
}

/// The reconciliation store for one viewing session.
#[derive(Debug, Default)]
pub struct BoardMirror {
    board: Option<BoardView>,
    online: Vec<UserPresence>,
}

impl BoardMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the tree wholesale (initial load or reconcile).
    pub fn load(&mut self, view: BoardView) {
        self.board = Some(view);
    }

    /// Authoritative re-fetch, replacing the tree.
    pub fn refresh(&mut self, sink: &impl CommandSink, board: BoardId) -> Result<()> {
        let view = sink.fetch_board(board)?;
        self.load(view);
        Ok(())
    }

    /// Drop the tree and presence list (navigation away).
    pub fn clear(&mut self) {
        self.board = None;
        self.online.clear();
    }

    pub fn board(&self) -> Option<&BoardView> {
        self.board.as_ref()
    }

    pub fn online(&self) -> &[UserPresence] {
        &self.online
    }

    fn view_mut(&mut self) -> Result<&mut BoardView> {
        self.board
            .as_mut()
            .ok_or_else(|| Error::Invalid("no board loaded".to_string()))
    }

    /// Merge one broadcast event. Mutation events go through the shared
    /// reducer; presence events maintain the online-users list.
    pub fn apply_remote(&mut self, event: &BoardEvent) {
        if !event.is_presence() {
            if let Some(view) = self.board.as_mut() {
                apply_event(view, event);
            }
            return;
        }
        match event {
            BoardEvent::UserJoined { user_id, user_name } => {
                self.online.retain(|presence| presence.user_id != *user_id);
                self.online.push(UserPresence {
                    user_id: *user_id,
                    user_name: user_name.clone(),
                    connected_at: chrono::Utc::now(),
                });
            }
            BoardEvent::UserLeft(user_id) => {
                self.online.retain(|presence| presence.user_id != *user_id);
            }
            BoardEvent::CurrentUsers(list) => {
                self.online = list.clone();
            }
            _ => {}
        }
    }

    /// Optimistically move a task, then confirm with the engine. On
    /// rejection the tree is restored to the pre-command snapshot; on
    /// success the authoritative result replaces the guess if they
    /// differ (another mutation may have landed first server-side).
    pub fn move_task(
        &mut self,
        sink: &impl CommandSink,
        task_id: TaskId,
        target_column: ColumnId,
        target_index: i64,
    ) -> Result<()> {
        let view = self.view_mut()?;
        if view.find_task(task_id).is_none() {
            return Err(Error::not_found("task", task_id));
        }
        // Unknown target in the *local* tree is detectable up front;
        // splicing first would drop the task until the next refresh.
        // The silent-ignore tolerance is for remote events only.
        if view.column(target_column).is_none() {
            return Err(Error::not_found("column", target_column));
        }
        let snapshot = view.clone();

        let source_column_id = view
            .find_task(task_id)
            .map(|(column, _)| column)
            .unwrap_or(target_column);
        apply_event(
            view,
            &BoardEvent::TaskMoved(crate::events::TaskMoved {
                task_id,
                source_column_id,
                target_column_id: target_column,
                new_order_index: target_index,
            }),
        );

        match sink.move_task(task_id, target_column, target_index) {
            Ok(moved) => {
                let guessed = view
                    .find_task(task_id)
                    .map(|(column, task)| (column, task.order_index));
                let authoritative = (moved.task.column_id, moved.task.order_index);
                if guessed != Some(authoritative) {
                    debug!(%task_id, "server result differs from optimistic guess, reconciling");
                    apply_event(
                        view,
                        &BoardEvent::TaskMoved(crate::events::TaskMoved {
                            task_id,
                            source_column_id: target_column,
                            target_column_id: moved.task.column_id,
                            new_order_index: moved.task.order_index,
                        }),
                    );
                }
                Ok(())
            }
            Err(err) => {
                *view = snapshot;
                Err(err)
            }
        }
    }

    /// Optimistically reorder the board's columns, with rollback.
    pub fn reorder_columns(
        &mut self,
        sink: &impl CommandSink,
        order: &[ColumnId],
    ) -> Result<()> {
        let view = self.view_mut()?;
        let board_id = view.id;
        let snapshot = view.clone();
        apply_event(view, &BoardEvent::ColumnsReordered(order.to_vec()));

        if let Err(err) = sink.reorder_columns(board_id, order) {
            *view = snapshot;
            return Err(err);
        }
        Ok(())
    }

    /// Optimistically delete a task, with rollback.
    pub fn delete_task(&mut self, sink: &impl CommandSink, task_id: TaskId) -> Result<()> {
        let view = self.view_mut()?;
        let snapshot = view.clone();
        apply_event(view, &BoardEvent::TaskDeleted(task_id));

        if let Err(err) = sink.delete_task(task_id) {
            *view = snapshot;
            return Err(err);
        }
        Ok(())
    }

    /// Optimistically delete a column, with rollback.
    pub fn delete_column(&mut self, sink: &impl CommandSink, column_id: ColumnId) -> Result<()> {
        let view = self.view_mut()?;
        let snapshot = view.clone();
        apply_event(view, &BoardEvent::ColumnDeleted(column_id));

        if let Err(err) = sink.delete_column(column_id) {
            *view = snapshot;
            return Err(err);
        }
        Ok(())
    }

    /// Create a task. The id is server-assigned, so the splice happens
    /// on the response rather than optimistically.
    pub fn create_task(
        &mut self,
        sink: &impl CommandSink,
        column: ColumnId,
        draft: TaskDraft,
    ) -> Result<Task> {
        self.view_mut()?;
        let task = sink.create_task(column, draft)?;
        if let Some(view) = self.board.as_mut() {
            apply_event(view, &BoardEvent::TaskCreated(task.clone()));
        }
        Ok(task)
    }

    /// Patch a task with the server's canonical result.
    pub fn update_task(
        &mut self,
        sink: &impl CommandSink,
        task_id: TaskId,
        patch: &TaskPatch,
    ) -> Result<Task> {
        self.view_mut()?;
        let task = sink.update_task(task_id, patch)?;
        if let Some(view) = self.board.as_mut() {
            apply_event(view, &BoardEvent::TaskUpdated(task.clone()));
        }
        Ok(task)
    }

    /// Create a column from the server's canonical result.
    pub fn create_column(
        &mut self,
        sink: &impl CommandSink,
        name: &str,
        color: Option<String>,
    ) -> Result<Column> {
        let board_id = self.view_mut()?.id;
        let column = sink.create_column(board_id, name, color)?;
        if let Some(view) = self.board.as_mut() {
            apply_event(view, &BoardEvent::ColumnCreated(column.clone()));
        }
        Ok(column)
    }

    /// Patch a column with the server's canonical result.
    pub fn update_column(
        &mut self,
        sink: &impl CommandSink,
        column_id: ColumnId,
        name: Option<&str>,
        color: Option<String>,
    ) -> Result<Column> {
        self.view_mut()?;
        let column = sink.update_column(column_id, name, color)?;
        if let Some(view) = self.board.as_mut() {
            apply_event(view, &BoardEvent::ColumnUpdated(column.clone()));
        }
        Ok(column)
    }
}
