use liveboard::events::BoardEvent;
use liveboard::hub::{EventReceiver, Hub};
use liveboard::model::{BoardId, ConnectionId, TaskId, UserId};

fn drain(rx: &mut EventReceiver) -> Vec<BoardEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[test]
fn presence_symmetry() {
    let hub = Hub::default();
    let board = BoardId::new();
    let conn1 = ConnectionId::from("conn-1");
    let conn2 = ConnectionId::from("conn-2");
    let user1 = UserId::new();
    let user2 = UserId::new();

    let mut rx1 = hub.connect(conn1.clone(), user1, "One").unwrap();
    let mut rx2 = hub.connect(conn2.clone(), user2, "Two").unwrap();

    hub.join(&conn1, board).unwrap();
    hub.join(&conn2, board).unwrap();

    // conn1 receives a UserJoined for conn2
    let events = drain(&mut rx1);
    assert!(events.iter().any(|e| matches!(
        e,
        BoardEvent::UserJoined { user_id, user_name } if *user_id == user2 && user_name == "Two"
    )));

    // conn2 receives a CurrentUsers list containing conn1
    let events = drain(&mut rx2);
    let roster = events
        .iter()
        .find_map(|e| match e {
            BoardEvent::CurrentUsers(list) => Some(list),
            _ => None,
        })
        .expect("joining connection gets the roster");
    assert!(roster.iter().any(|p| p.user_id == user1));

    // after conn2 disconnects, conn1 receives UserLeft(user2)
    hub.disconnect(&conn2);
    let events = drain(&mut rx1);
    assert!(events
        .iter()
        .any(|e| matches!(e, BoardEvent::UserLeft(id) if *id == user2)));
}

#[test]
fn publish_reaches_everyone_but_the_originator() {
    let hub = Hub::default();
    let board = BoardId::new();
    let conns: Vec<ConnectionId> = (0..4)
        .map(|i| ConnectionId::from(format!("conn-{i}").as_str()))
        .collect();
    let mut receivers: Vec<EventReceiver> = conns
        .iter()
        .enumerate()
        .map(|(i, conn)| {
            hub.connect(conn.clone(), UserId::new(), &format!("User {i}"))
                .unwrap()
        })
        .collect();
    for conn in &conns {
        hub.join(conn, board).unwrap();
    }
    for rx in &mut receivers {
        drain(rx);
    }

    let event = BoardEvent::TaskDeleted(TaskId::new());
    hub.publish_event(board, event.clone(), Some(&conns[0]));

    assert!(drain(&mut receivers[0]).is_empty());
    for rx in &mut receivers[1..] {
        assert_eq!(drain(rx), vec![event.clone()]);
    }
}

#[test]
fn events_stay_within_their_board() {
    let hub = Hub::default();
    let board_a = BoardId::new();
    let board_b = BoardId::new();
    let conn_a = ConnectionId::from("a");
    let conn_b = ConnectionId::from("b");

    let mut rx_a = hub.connect(conn_a.clone(), UserId::new(), "A").unwrap();
    let mut rx_b = hub.connect(conn_b.clone(), UserId::new(), "B").unwrap();
    hub.join(&conn_a, board_a).unwrap();
    hub.join(&conn_b, board_b).unwrap();
    drain(&mut rx_a);
    drain(&mut rx_b);

    hub.publish_event(board_a, BoardEvent::TaskDeleted(TaskId::new()), None);

    assert_eq!(drain(&mut rx_a).len(), 1);
    assert!(drain(&mut rx_b).is_empty());
}

#[test]
fn two_hubs_are_independent() {
    let hub1 = Hub::default();
    let hub2 = Hub::default();
    let board = BoardId::new();
    let conn = ConnectionId::from("shared-name");

    let mut rx1 = hub1.connect(conn.clone(), UserId::new(), "One").unwrap();
    let _rx2 = hub2.connect(conn.clone(), UserId::new(), "Two").unwrap();
    hub1.join(&conn, board).unwrap();

    hub2.publish_event(board, BoardEvent::TaskDeleted(TaskId::new()), None);
    assert!(drain(&mut rx1)
        .iter()
        .all(|e| !matches!(e, BoardEvent::TaskDeleted(_))));

    assert_eq!(hub1.connection_count(), 1);
    assert_eq!(hub2.connection_count(), 1);
}
