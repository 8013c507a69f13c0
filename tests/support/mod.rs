use std::sync::Arc;

use liveboard::engine::BoardEngine;
use liveboard::hub::Hub;
use liveboard::model::{BoardId, BoardView, ColumnId, TaskDraft, TaskId, UserId};
use liveboard::storage::{AllowAll, MemoryStore};

/// Engine + hub wired together over a shared in-memory store, with one
/// writable actor. The starting point for most scenarios.
pub struct Fixture {
    pub hub: Arc<Hub>,
    pub engine: BoardEngine<Arc<MemoryStore>, AllowAll, Arc<Hub>>,
    pub actor: UserId,
}

impl Fixture {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let hub = Arc::new(Hub::default());
        let engine = BoardEngine::new(store, AllowAll, Arc::clone(&hub));
        Self {
            hub,
            engine,
            actor: UserId::new(),
        }
    }

    /// Board with a "Todo" column holding tasks A, B, C and an empty
    /// "Done" column.
    pub fn todo_done_board(&self) -> (BoardId, ColumnId, ColumnId, Vec<TaskId>) {
        let board = self.engine.create_board("Sprint", false).unwrap();
        let todo = self
            .engine
            .create_column(self.actor, None, board.id, "Todo", None)
            .unwrap();
        let done = self
            .engine
            .create_column(self.actor, None, board.id, "Done", None)
            .unwrap();
        let tasks = ["A", "B", "C"]
            .iter()
            .map(|title| {
                self.engine
                    .create_task(self.actor, None, todo.id, TaskDraft::titled(*title))
                    .unwrap()
                    .id
            })
            .collect();
        (board.id, todo.id, done.id, tasks)
    }

    pub fn view(&self, board: BoardId) -> BoardView {
        self.engine.load_board(self.actor, board).unwrap()
    }
}

/// Structural skeleton of a board: column ids in order, each with its
/// task ids in order. Timestamps and field contents are excluded, so a
/// locally-reconciled tree can be compared against the server's.
pub fn layout(view: &BoardView) -> Vec<(ColumnId, Vec<TaskId>)> {
    view.columns
        .iter()
        .map(|column| (column.id, column.tasks.iter().map(|t| t.id).collect()))
        .collect()
}

/// The dense-order invariant: column indices are exactly `0..N-1` and
/// every column's task indices are exactly `0..M-1`.
pub fn assert_dense(view: &BoardView) {
    let mut column_indices: Vec<i64> = view.columns.iter().map(|c| c.order_index).collect();
    column_indices.sort_unstable();
    let expected: Vec<i64> = (0..view.columns.len() as i64).collect();
    assert_eq!(column_indices, expected, "column order has gaps or duplicates");

    for column in &view.columns {
        let mut task_indices: Vec<i64> = column.tasks.iter().map(|t| t.order_index).collect();
        task_indices.sort_unstable();
        let expected: Vec<i64> = (0..column.tasks.len() as i64).collect();
        assert_eq!(
            task_indices, expected,
            "task order in column {} has gaps or duplicates",
            column.name
        );
    }
}
