//! Storage collaborator for the mutation engine.
//!
//! Persistence is external to this crate; the engine only needs two
//! contracts:
//! - `AccessPolicy`: "may this actor mutate this board"
//! - `BoardStore`: id-based lookup plus an atomic per-board transaction
//!
//! `MemoryStore` is the in-process reference implementation: an arena of
//! boards keyed by id, one mutex per board. All relocate/reindex work
//! for a board runs under that board's lock, which serializes mutations
//! per parent scope (both parents of a cross-column move belong to one
//! board; columns are never shared across boards). Mutations on
//! different boards proceed concurrently.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use crate::error::{Error, Result};
use crate::model::{
    ActivityEntry, Board, BoardId, Column, ColumnId, Task, TaskId, UserId,
};

/// Authorization boundary: "may the caller mutate this board".
pub trait AccessPolicy: Send + Sync {
    fn can_write(&self, actor: UserId, board: BoardId) -> bool;
}

/// Policy that admits every actor. Test and single-tenant use.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl AccessPolicy for AllowAll {
    fn can_write(&self, _actor: UserId, _board: BoardId) -> bool {
        true
    }
}

/// Everything belonging to one board, owned by that board's lock.
#[derive(Debug, Clone, Default)]
pub struct BoardArena {
    pub board: Option<Board>,
    pub columns: Vec<Column>,
    pub tasks: Vec<Task>,
    pub activity: Vec<ActivityEntry>,
}

impl BoardArena {
    pub fn column(&self, id: ColumnId) -> Option<&Column> {
        self.columns.iter().find(|column| column.id == id)
    }

    pub fn column_mut(&mut self, id: ColumnId) -> Option<&mut Column> {
        self.columns.iter_mut().find(|column| column.id == id)
    }

    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    pub fn task_mut(&mut self, id: TaskId) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|task| task.id == id)
    }

    /// Tasks of one column, sorted by order index.
    pub fn tasks_in(&self, column: ColumnId) -> Vec<&Task> {
        let mut tasks: Vec<&Task> = self
            .tasks
            .iter()
            .filter(|task| task.column_id == column)
            .collect();
        tasks.sort_by_key(|task| task.order_index);
        tasks
    }

    pub fn task_count(&self, column: ColumnId) -> usize {
        self.tasks
            .iter()
            .filter(|task| task.column_id == column)
            .count()
    }

    /// Mutable refs to one column's tasks, order unspecified.
    pub fn tasks_in_mut(&mut self, column: ColumnId) -> impl Iterator<Item = &mut Task> {
        self.tasks
            .iter_mut()
            .filter(move |task| task.column_id == column)
    }
}

/// Storage contract consumed by the engine. `with_board` is the atomic
/// unit: the closure either returns `Ok` and its effects are kept, or
/// returns `Err` and the board is left exactly as it was.
pub trait BoardStore: Send + Sync {
    /// Create an empty board and register it.
    fn insert_board(&self, board: Board) -> Result<()>;

    /// Resolve the board owning a column.
    fn board_of_column(&self, column: ColumnId) -> Result<BoardId>;

    /// Resolve the board owning a task.
    fn board_of_task(&self, task: TaskId) -> Result<BoardId>;

    /// Run `f` against the board's arena under its lock. No other
    /// mutation of the same board is observable while `f` runs.
    fn with_board<T>(&self, board: BoardId, f: impl FnOnce(&mut BoardArena) -> Result<T>)
        -> Result<T>;

    /// Run a read-only `f` against the board's arena.
    fn read_board<T>(&self, board: BoardId, f: impl FnOnce(&BoardArena) -> T) -> Result<T> {
        self.with_board(board, |arena| Ok(f(arena)))
    }
}

impl<S: BoardStore> BoardStore for Arc<S> {
    fn insert_board(&self, board: Board) -> Result<()> {
        (**self).insert_board(board)
    }
    fn board_of_column(&self, column: ColumnId) -> Result<BoardId> {
        (**self).board_of_column(column)
    }
    fn board_of_task(&self, task: TaskId) -> Result<BoardId> {
        (**self).board_of_task(task)
    }
    fn with_board<T>(
        &self,
        board: BoardId,
        f: impl FnOnce(&mut BoardArena) -> Result<T>,
    ) -> Result<T> {
        (**self).with_board(board, f)
    }
}

/// In-memory board storage: arena per board behind a per-board mutex.
#[derive(Debug, Default)]
pub struct MemoryStore {
    boards: RwLock<HashMap<BoardId, Arc<Mutex<BoardArena>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn arena(&self, board: BoardId) -> Result<Arc<Mutex<BoardArena>>> {
        let boards = self
            .boards
            .read()
            .map_err(|_| Error::Transient("board table poisoned".to_string()))?;
        boards
            .get(&board)
            .cloned()
            .ok_or_else(|| Error::not_found("board", board))
    }
}

impl BoardStore for MemoryStore {
    fn insert_board(&self, board: Board) -> Result<()> {
        let mut boards = self
            .boards
            .write()
            .map_err(|_| Error::Transient("board table poisoned".to_string()))?;
        let id = board.id;
        let arena = BoardArena {
            board: Some(board),
            ..BoardArena::default()
        };
        boards.insert(id, Arc::new(Mutex::new(arena)));
        Ok(())
    }

    fn board_of_column(&self, column: ColumnId) -> Result<BoardId> {
        let boards = self
            .boards
            .read()
            .map_err(|_| Error::Transient("board table poisoned".to_string()))?;
        for (board_id, arena) in boards.iter() {
            let arena = arena
                .lock()
                .map_err(|_| Error::Transient("board lock poisoned".to_string()))?;
            if arena.column(column).is_some() {
                return Ok(*board_id);
            }
        }
        Err(Error::not_found("column", column))
    }

    fn board_of_task(&self, task: TaskId) -> Result<BoardId> {
        let boards = self
            .boards
            .read()
            .map_err(|_| Error::Transient("board table poisoned".to_string()))?;
        for (board_id, arena) in boards.iter() {
            let arena = arena
                .lock()
                .map_err(|_| Error::Transient("board lock poisoned".to_string()))?;
            if arena.task(task).is_some() {
                return Ok(*board_id);
            }
        }
        Err(Error::not_found("task", task))
    }

    fn with_board<T>(
        &self,
        board: BoardId,
        f: impl FnOnce(&mut BoardArena) -> Result<T>,
    ) -> Result<T> {
        let arena = self.arena(board)?;
        let mut guard = arena
            .lock()
            .map_err(|_| Error::Transient("board lock poisoned".to_string()))?;
        // All-or-nothing: work on a copy, commit only on Ok.
        let mut staged = guard.clone();
        let value = f(&mut staged)?;
        *guard = staged;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crate::model::TaskDraft;

    fn board() -> Board {
        Board {
            id: BoardId::new(),
            name: "Sprint 12".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_insert_and_lookup() {
        let store = MemoryStore::new();
        let b = board();
        let board_id = b.id;
        store.insert_board(b).unwrap();

        let column_id = ColumnId::new();
        store
            .with_board(board_id, |arena| {
                arena.columns.push(Column {
                    id: column_id,
                    board_id,
                    name: "Todo".to_string(),
                    order_index: 0,
                    color: None,
                });
                Ok(())
            })
            .unwrap();

        assert_eq!(store.board_of_column(column_id).unwrap(), board_id);
        assert!(matches!(
            store.board_of_column(ColumnId::new()),
            Err(Error::NotFound { entity: "column", .. })
        ));
    }

    #[test]
    fn test_with_board_rolls_back_on_err() {
        let store = MemoryStore::new();
        let b = board();
        let board_id = b.id;
        store.insert_board(b).unwrap();

        let result: Result<()> = store.with_board(board_id, |arena| {
            arena.columns.push(Column {
                id: ColumnId::new(),
                board_id,
                name: "Doomed".to_string(),
                order_index: 0,
                color: None,
            });
            Err(Error::Invalid("abort".to_string()))
        });
        assert!(result.is_err());

        let count = store.read_board(board_id, |arena| arena.columns.len()).unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_tasks_in_sorted_by_index() {
        let mut arena = BoardArena::default();
        let column = ColumnId::new();
        for index in [2i64, 0, 1] {
            arena
                .tasks
                .push(Task::from_draft(column, index, TaskDraft::titled(format!("t{index}"))));
        }
        let ordered: Vec<i64> = arena.tasks_in(column).iter().map(|t| t.order_index).collect();
        assert_eq!(ordered, vec![0, 1, 2]);
        assert_eq!(arena.task_count(column), 3);
    }

    #[test]
    fn test_unknown_board() {
        let store = MemoryStore::new();
        let result = store.read_board(BoardId::new(), |_| ());
        assert!(matches!(result, Err(Error::NotFound { entity: "board", .. })));
    }
}
