use super::*;

fn conv(id: &str) -> ConversationId {
    ConversationId::from(id)
}

#[tokio::test]
async fn first_join_creates_the_room() {
    let registry = RoomRegistry::new();
    let conn = ConnectionId::new();

    assert!(registry.join(conn, &conv("conv-1")).await);
    assert_eq!(registry.room_count().await, 1);
    assert_eq!(registry.members(&conv("conv-1")).await, vec![conn]);
}

#[tokio::test]
async fn join_is_idempotent() {
    let registry = RoomRegistry::new();
    let conn = ConnectionId::new();

    assert!(registry.join(conn, &conv("conv-1")).await);
    assert!(!registry.join(conn, &conv("conv-1")).await);
    assert_eq!(registry.members(&conv("conv-1")).await.len(), 1);
}

#[tokio::test]
async fn leave_reclaims_an_emptied_room() {
    let registry = RoomRegistry::new();
    let conn = ConnectionId::new();
    registry.join(conn, &conv("conv-1")).await;

    assert!(registry.leave(conn, &conv("conv-1")).await);
    assert_eq!(registry.room_count().await, 0);
    assert!(registry.members(&conv("conv-1")).await.is_empty());
    assert!(registry.rooms_of(conn).await.is_empty());
}

#[tokio::test]
async fn leave_of_non_member_is_a_noop() {
    let registry = RoomRegistry::new();
    let member = ConnectionId::new();
    let outsider = ConnectionId::new();
    registry.join(member, &conv("conv-1")).await;

    assert!(!registry.leave(outsider, &conv("conv-1")).await);
    assert!(!registry.leave(member, &conv("conv-2")).await);
    assert_eq!(registry.members(&conv("conv-1")).await, vec![member]);
}

#[tokio::test]
async fn leave_all_clears_every_membership() {
    let registry = RoomRegistry::new();
    let a = ConnectionId::new();
    let b = ConnectionId::new();
    registry.join(a, &conv("conv-1")).await;
    registry.join(a, &conv("conv-2")).await;
    registry.join(b, &conv("conv-2")).await;

    let left = registry.leave_all(a).await;
    assert_eq!(left, vec![conv("conv-1"), conv("conv-2")]);
    assert!(registry.rooms_of(a).await.is_empty());
    assert_eq!(registry.members(&conv("conv-2")).await, vec![b]);
    // conv-1 emptied out and was reclaimed
    assert_eq!(registry.room_count().await, 1);
}

#[tokio::test]
async fn leave_all_for_unknown_connection_is_empty() {
    let registry = RoomRegistry::new();
    assert!(registry.leave_all(ConnectionId::new()).await.is_empty());
}

#[tokio::test]
async fn members_of_absent_room_is_empty() {
    let registry = RoomRegistry::new();
    assert!(registry.members(&conv("nowhere")).await.is_empty());
}

#[tokio::test]
async fn members_are_reported_in_stable_order() {
    let registry = RoomRegistry::new();
    let mut conns = vec![ConnectionId::new(), ConnectionId::new(), ConnectionId::new()];
    for conn in &conns {
        registry.join(*conn, &conv("conv-1")).await;
    }
    conns.sort();

    assert_eq!(registry.members(&conv("conv-1")).await, conns);
    assert_eq!(registry.members(&conv("conv-1")).await, conns);
}

#[tokio::test]
async fn unrelated_rooms_do_not_interfere() {
    let registry = RoomRegistry::new();
    let a = ConnectionId::new();
    let b = ConnectionId::new();

    let room_a = conv("conv-1");
    let room_b = conv("conv-2");
    let (joined_a, joined_b) = tokio::join!(
        registry.join(a, &room_a),
        registry.join(b, &room_b),
    );
    assert!(joined_a && joined_b);
    assert_eq!(registry.room_count().await, 2);

    registry.leave(a, &conv("conv-1")).await;
    assert_eq!(registry.members(&conv("conv-2")).await, vec![b]);
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_joins_to_one_room_keep_the_member_set_exact() {
    let registry = Arc::new(RoomRegistry::new());
    let mut conns: Vec<ConnectionId> = (0..16).map(|_| ConnectionId::new()).collect();

    // every connection races a duplicate of its own join
    let mut tasks = Vec::new();
    for conn in &conns {
        for _ in 0..2 {
            let registry = Arc::clone(&registry);
            let conn = *conn;
            tasks.push(tokio::spawn(async move {
                registry.join(conn, &conv("conv-1")).await
            }));
        }
    }
    let mut first_joins = 0;
    for task in tasks {
        if task.await.expect("join task") {
            first_joins += 1;
        }
    }

    conns.sort();
    assert_eq!(first_joins, conns.len());
    assert_eq!(registry.members(&conv("conv-1")).await, conns);
    assert_eq!(registry.room_count().await, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn interleaved_joins_and_leaves_settle_on_the_survivors() {
    let registry = Arc::new(RoomRegistry::new());
    let room = conv("conv-1");

    let stayer = ConnectionId::new();
    let leaver = ConnectionId::new();
    let drop_out = ConnectionId::new();
    for conn in [stayer, leaver, drop_out] {
        registry.join(conn, &room).await;
    }
    registry.join(drop_out, &conv("conv-2")).await;

    let joiners: Vec<ConnectionId> = (0..8).map(|_| ConnectionId::new()).collect();
    let mut tasks = Vec::new();
    for conn in &joiners {
        let registry = Arc::clone(&registry);
        let (conn, room) = (*conn, room.clone());
        tasks.push(tokio::spawn(async move {
            registry.join(conn, &room).await;
        }));
    }
    {
        let registry = Arc::clone(&registry);
        let room = room.clone();
        tasks.push(tokio::spawn(async move {
            registry.leave(leaver, &room).await;
        }));
    }
    {
        let registry = Arc::clone(&registry);
        tasks.push(tokio::spawn(async move {
            registry.leave_all(drop_out).await;
        }));
    }
    for task in tasks {
        task.await.expect("registry task");
    }

    let mut survivors = joiners.clone();
    survivors.push(stayer);
    survivors.sort();
    assert_eq!(registry.members(&room).await, survivors);
    assert!(registry.rooms_of(drop_out).await.is_empty());
    // conv-2 emptied out with the drop-out and was reclaimed
    assert_eq!(registry.room_count().await, 1);

    for conn in survivors {
        registry.leave(conn, &room).await;
    }
    assert_eq!(registry.room_count().await, 0);
    assert!(registry.members(&room).await.is_empty());
}
