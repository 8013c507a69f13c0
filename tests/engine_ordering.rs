mod support;

use liveboard::engine::BoardEngine;
use liveboard::events::NoopPublisher;
use liveboard::model::{ActivityAction, TaskDraft, TaskId};
use liveboard::storage::{AllowAll, MemoryStore};
use support::{assert_dense, Fixture};

#[test]
fn move_to_empty_column_concrete_scenario() {
    let fx = Fixture::new();
    let (board, todo, done, tasks) = fx.todo_done_board();
    let b = tasks[1];

    fx.engine.move_task(fx.actor, None, b, done, 0).unwrap();

    let view = fx.view(board);
    let todo_view = view.column(todo).unwrap();
    let layout: Vec<(&str, i64)> = todo_view
        .tasks
        .iter()
        .map(|t| (t.title.as_str(), t.order_index))
        .collect();
    assert_eq!(layout, vec![("A", 0), ("C", 1)]);

    let done_view = view.column(done).unwrap();
    assert_eq!(done_view.tasks.len(), 1);
    assert_eq!(done_view.tasks[0].title, "B");
    assert_eq!(done_view.tasks[0].order_index, 0);

    let activity = fx.engine.activity(fx.actor, b).unwrap();
    let moves: Vec<_> = activity
        .iter()
        .filter(|e| e.action == ActivityAction::Moved)
        .collect();
    assert_eq!(moves.len(), 1);
    assert_eq!(
        moves[0].details.as_deref(),
        Some("Moved from \"Todo\" to \"Done\"")
    );
}

#[test]
fn relocate_between_populated_columns() {
    // Move T from column A (position 2 of 5) to column B (position 1 of 3).
    let fx = Fixture::new();
    let board = fx.engine.create_board("Sprint", false).unwrap();
    let col_a = fx
        .engine
        .create_column(fx.actor, None, board.id, "A", None)
        .unwrap();
    let col_b = fx
        .engine
        .create_column(fx.actor, None, board.id, "B", None)
        .unwrap();

    let a_tasks: Vec<TaskId> = (0..5)
        .map(|i| {
            fx.engine
                .create_task(fx.actor, None, col_a.id, TaskDraft::titled(format!("a{i}")))
                .unwrap()
                .id
        })
        .collect();
    let b_tasks: Vec<TaskId> = (0..3)
        .map(|i| {
            fx.engine
                .create_task(fx.actor, None, col_b.id, TaskDraft::titled(format!("b{i}")))
                .unwrap()
                .id
        })
        .collect();

    let t = a_tasks[2];
    let moved = fx.engine.move_task(fx.actor, None, t, col_b.id, 1).unwrap();
    assert_eq!(moved.task.column_id, col_b.id);
    assert_eq!(moved.task.order_index, 1);

    let view = fx.view(board.id);
    assert_dense(&view);

    // A keeps its remaining four in original relative order
    let a_view = view.column(col_a.id).unwrap();
    let a_order: Vec<TaskId> = a_view.tasks.iter().map(|t| t.id).collect();
    assert_eq!(a_order, vec![a_tasks[0], a_tasks[1], a_tasks[3], a_tasks[4]]);

    // B holds T at slot 1, originals shifted around it
    let b_view = view.column(col_b.id).unwrap();
    let b_order: Vec<TaskId> = b_view.tasks.iter().map(|t| t.id).collect();
    assert_eq!(b_order, vec![b_tasks[0], t, b_tasks[1], b_tasks[2]]);
}

#[test]
fn dense_invariant_survives_operation_sequences() {
    let fx = Fixture::new();
    let (board, todo, done, tasks) = fx.todo_done_board();

    fx.engine.move_task(fx.actor, None, tasks[2], done, 0).unwrap();
    fx.engine.move_task(fx.actor, None, tasks[0], done, 5).unwrap();
    fx.engine.move_task(fx.actor, None, tasks[1], todo, 0).unwrap();
    fx.engine.delete_task(fx.actor, None, tasks[2]).unwrap();
    let extra = fx
        .engine
        .create_task(fx.actor, None, done, TaskDraft::titled("D"))
        .unwrap();
    fx.engine.move_task(fx.actor, None, extra.id, todo, 1).unwrap();
    fx.engine
        .reorder_columns(fx.actor, None, board, &[done, todo])
        .unwrap();

    let view = fx.view(board);
    assert_dense(&view);
    assert_eq!(view.columns[0].id, done);
    assert_eq!(view.columns[1].id, todo);
}

#[test]
fn reindex_twice_equals_once() {
    let fx = Fixture::new();
    let (board, todo, done, _) = fx.todo_done_board();

    fx.engine
        .reorder_columns(fx.actor, None, board, &[done, todo])
        .unwrap();
    let once = fx.view(board);
    fx.engine
        .reorder_columns(fx.actor, None, board, &[done, todo])
        .unwrap();
    let twice = fx.view(board);
    assert_eq!(once.columns, twice.columns);
}

#[test]
fn move_past_end_appends() {
    let fx = Fixture::new();
    let (board, _, done, tasks) = fx.todo_done_board();

    fx.engine.move_task(fx.actor, None, tasks[0], done, 40).unwrap();
    fx.engine.move_task(fx.actor, None, tasks[1], done, 40).unwrap();

    let view = fx.view(board);
    let done_view = view.column(done).unwrap();
    let order: Vec<TaskId> = done_view.tasks.iter().map(|t| t.id).collect();
    assert_eq!(order, vec![tasks[0], tasks[1]]);
    assert_dense(&view);
}

#[test]
fn unknown_target_column_rejects_without_mutation() {
    let fx = Fixture::new();
    let (board, _, _, tasks) = fx.todo_done_board();
    let before = fx.view(board);

    let stranger = fx.engine.create_board("Other", true).unwrap();
    let stranger_view = fx.view(stranger.id);
    let foreign_column = stranger_view.columns[0].id;

    // Cross-board relocation is refused: the task's board does not
    // contain the target column.
    let result = fx
        .engine
        .move_task(fx.actor, None, tasks[0], foreign_column, 0);
    assert!(matches!(
        result,
        Err(liveboard::Error::NotFound { entity: "column", .. })
    ));
    assert_eq!(fx.view(board), before);
}

#[test]
fn engine_without_hub_still_mutates() {
    let engine = BoardEngine::new(MemoryStore::new(), AllowAll, NoopPublisher);
    let actor = liveboard::model::UserId::new();
    let board = engine.create_board("Solo", true).unwrap();
    let view = engine.load_board(actor, board.id).unwrap();
    assert_eq!(view.columns.len(), 5);
    assert_dense(&view);
}
