mod common;

use common::World;
use pchat_client::session::{SEND_FAILED, UNCONFIRMED};
use pchat_client::{
    ClientError, ConversationMonitor, EntryState, KnownChats, SessionEvent, SessionPhase,
    SyncSession,
};
use pchat_common::Payload;
use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

async fn next_status(events: &mut broadcast::Receiver<SessionEvent>) -> String {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("no status line")
            .unwrap();
        if let SessionEvent::Status(line) = event {
            return line;
        }
    }
}

fn drain(events: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}

#[tokio::test]
async fn test_open_loads_recent_in_order() {
    let world = World::new().await;
    let c = world.sync.start_im(&world.alice.id, "bob").await.unwrap();
    let first = world.bob_says(&c, "one").await;
    let second = world.bob_says(&c, "two").await;

    let session = SyncSession::open(
        world.api(&world.alice),
        world.config(&world.alice),
        &c,
        KnownChats::new(),
    )
    .await
    .unwrap();

    let stamps: Vec<_> = session.entries().iter().map(|e| e.key.timestamp).collect();
    assert_eq!(stamps, vec![first, second]);
    assert_eq!(session.last_known(), second);
    assert_eq!(session.phase(), SessionPhase::Idle);
    assert_eq!(session.info().title, "bob");
}

#[tokio::test]
async fn test_repeated_fetches_never_duplicate() {
    let world = World::new().await;
    let c = world.sync.start_im(&world.alice.id, "bob").await.unwrap();
    let session = SyncSession::open(
        world.api(&world.alice),
        world.config(&world.alice),
        &c,
        KnownChats::new(),
    )
    .await
    .unwrap();

    let mut last_known = Vec::new();
    for text in ["a", "b", "c"] {
        world.bob_says(&c, text).await;
        session.fetch_once().await.unwrap();
        session.fetch_once().await.unwrap();
        last_known.push(session.last_known());
    }

    let entries = session.entries();
    assert_eq!(entries.len(), 3);
    let keys: HashSet<_> = entries.iter().map(|e| e.key.clone()).collect();
    assert_eq!(keys.len(), 3);
    assert!(last_known.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(session.fetch_once().await.unwrap(), 0);
}

#[tokio::test]
async fn test_echo_reconciles_to_one_confirmed_entry() {
    let world = World::new().await;
    let c = world.sync.start_im(&world.alice.id, "bob").await.unwrap();
    let session = SyncSession::open(
        world.api(&world.alice),
        world.config(&world.alice),
        &c,
        KnownChats::new(),
    )
    .await
    .unwrap();

    let t = session.send_text("hello bob").await.unwrap();
    let entries = session.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].state, EntryState::Acknowledged);
    assert_eq!(entries[0].key.timestamp, t);

    session.fetch_once().await.unwrap();
    let entries = session.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].state, EntryState::Confirmed);
    assert_eq!(entries[0].key.timestamp, t);
    assert_eq!(entries[0].author.as_ref().unwrap().username, "alice");
}

#[tokio::test]
async fn test_failed_post_removes_echo() {
    let world = World::new().await;
    let c = world.sync.start_im(&world.alice.id, "bob").await.unwrap();
    let api = world.api(&world.alice);
    let session = SyncSession::open(api.clone(), world.config(&world.alice), &c, KnownChats::new())
        .await
        .unwrap();
    let mut events = session.subscribe();

    api.fail_posts.store(true, Ordering::SeqCst);
    let err = session.send_text("lost").await.unwrap_err();
    assert!(err.is_transient());
    assert!(session.entries().is_empty());

    let seen = drain(&mut events);
    assert!(seen.contains(&SessionEvent::Status(SEND_FAILED.to_string())));
    assert_eq!(world.sync.latest_timestamp(&c).await.unwrap(), 0);
}

#[tokio::test]
async fn test_failed_fetch_retries_same_range() {
    let world = World::new().await;
    let c = world.sync.start_im(&world.alice.id, "bob").await.unwrap();
    let api = world.api(&world.alice);
    let session = SyncSession::open(api.clone(), world.config(&world.alice), &c, KnownChats::new())
        .await
        .unwrap();
    let before = session.last_known();

    let t = world.bob_says(&c, "are you there").await;
    api.fail_since.store(true, Ordering::SeqCst);
    let err = session.fetch_once().await.unwrap_err();
    assert!(err.is_transient());
    assert_eq!(session.last_known(), before);
    assert_eq!(session.phase(), SessionPhase::Idle);
    assert!(session.entries().is_empty());

    api.fail_since.store(false, Ordering::SeqCst);
    assert_eq!(session.fetch_once().await.unwrap(), 1);
    assert_eq!(session.fetch_once().await.unwrap(), 0);
    let entries = session.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].key.timestamp, t);
    assert_eq!(session.last_known(), t);
}

#[tokio::test]
async fn test_acknowledged_echo_passed_by_fetch_is_orphaned_once() {
    let world = World::new().await;
    let c = world.sync.start_im(&world.alice.id, "bob").await.unwrap();
    let api = world.api(&world.alice);
    let session = SyncSession::open(api.clone(), world.config(&world.alice), &c, KnownChats::new())
        .await
        .unwrap();
    let mut events = session.subscribe();

    api.hide_own_since.store(true, Ordering::SeqCst);
    let mine = session.send_text("did this arrive").await.unwrap();
    let later = world.bob_says(&c, "after yours").await;
    assert!(later > mine);

    session.fetch_once().await.unwrap();
    session.fetch_once().await.unwrap();

    let entries = session.entries();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].key.timestamp, mine);
    assert_eq!(entries[0].state, EntryState::Orphaned);
    assert_eq!(entries[1].state, EntryState::Confirmed);

    let unconfirmed = drain(&mut events)
        .into_iter()
        .filter(|e| *e == SessionEvent::Status(UNCONFIRMED.to_string()))
        .count();
    assert_eq!(unconfirmed, 1);
}

#[tokio::test]
async fn test_blank_text_is_rejected_locally() {
    let world = World::new().await;
    let c = world.sync.start_im(&world.alice.id, "bob").await.unwrap();
    let session = SyncSession::open(
        world.api(&world.alice),
        world.config(&world.alice),
        &c,
        KnownChats::new(),
    )
    .await
    .unwrap();

    assert!(matches!(
        session.send_text("   ").await,
        Err(ClientError::InvalidArgument(_))
    ));
    assert!(session.entries().is_empty());
}

#[tokio::test]
async fn test_media_appears_only_after_fetch() {
    let world = World::new().await;
    let c = world.sync.start_im(&world.alice.id, "bob").await.unwrap();
    let session = SyncSession::open(
        world.api(&world.alice),
        world.config(&world.alice),
        &c,
        KnownChats::new(),
    )
    .await
    .unwrap();

    session.send_media("uploads/cat.jpg").await.unwrap();
    assert!(session.entries().is_empty());

    session.fetch_once().await.unwrap();
    let entries = session.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].payload, Payload::Media("uploads/cat.jpg".into()));
}

#[tokio::test]
async fn test_window_is_bounded_by_display_cap() {
    let world = World::new().await;
    let c = world.sync.start_im(&world.alice.id, "bob").await.unwrap();
    let mut config = world.config(&world.alice);
    config.display_cap = 5;
    let session = SyncSession::open(world.api(&world.alice), config, &c, KnownChats::new())
        .await
        .unwrap();

    let mut stamps = Vec::new();
    for i in 0..12 {
        stamps.push(world.bob_says(&c, &format!("msg {}", i)).await);
    }
    session.fetch_once().await.unwrap();

    let shown: Vec<_> = session.entries().iter().map(|e| e.key.timestamp).collect();
    assert_eq!(shown, stamps[7..].to_vec());
    assert_eq!(session.last_known(), stamps[11]);
}

#[tokio::test]
async fn test_clear_persists_checkpoint() {
    let world = World::new().await;
    let c = world.sync.start_im(&world.alice.id, "bob").await.unwrap();
    world.bob_says(&c, "old 1").await;
    let last = world.bob_says(&c, "old 2").await;

    let session = SyncSession::open(
        world.api(&world.alice),
        world.config(&world.alice),
        &c,
        KnownChats::new(),
    )
    .await
    .unwrap();
    assert_eq!(session.entries().len(), 2);

    session.clear().await.unwrap();
    assert!(session.entries().is_empty());
    assert_eq!(session.checkpoint(), last);
    assert_eq!(
        world.sync.directory().checkpoint_for(&c, &world.alice.id).await.unwrap(),
        last
    );

    // A fresh view starts after the checkpoint
    let reopened = SyncSession::open(
        world.api(&world.alice),
        world.config(&world.alice),
        &c,
        KnownChats::new(),
    )
    .await
    .unwrap();
    assert!(reopened.entries().is_empty());
    assert_eq!(reopened.last_known(), last);

    world.bob_says(&c, "new").await;
    reopened.fetch_once().await.unwrap();
    assert_eq!(reopened.entries().len(), 1);
}

#[tokio::test]
async fn test_forced_presence_reports_partner_state() {
    let world = World::new().await;
    let c = world.sync.start_im(&world.alice.id, "bob").await.unwrap();
    // Bob opening the conversation refreshes his last-seen time
    world.sync.recent(&world.bob.id, &c).await.unwrap();

    let session = SyncSession::open(
        world.api(&world.alice),
        world.config(&world.alice),
        &c,
        KnownChats::new(),
    )
    .await
    .unwrap();
    let mut events = session.subscribe();

    session.refresh_presence(true).await;
    let line = next_status(&mut events).await;
    assert!(line.starts_with("bob is active"), "{}", line);

    // Not due again within the sampling interval
    session.refresh_presence(false).await;
    assert!(drain(&mut events).is_empty());
}

#[tokio::test]
async fn test_rooms_have_no_presence() {
    let world = World::new().await;
    let c = world.sync.join_room(&world.alice.id, "lobby", true).await.unwrap();
    let session = SyncSession::open(
        world.api(&world.alice),
        world.config(&world.alice),
        &c,
        KnownChats::new(),
    )
    .await
    .unwrap();
    let mut events = session.subscribe();

    session.refresh_presence(true).await;
    assert!(drain(&mut events).is_empty());
}

#[tokio::test]
async fn test_leave_forgets_and_stops_polling() {
    let world = World::new().await;
    let c = world.sync.start_im(&world.alice.id, "bob").await.unwrap();
    let known = KnownChats::new();
    let mut config = world.config(&world.alice);
    config.poll_interval = Duration::from_millis(20);

    let session = SyncSession::open(world.api(&world.alice), config, &c, known.clone())
        .await
        .unwrap();
    assert!(known.contains(&c));
    let handle = session.spawn();

    session.leave().await.unwrap();
    assert!(!known.contains(&c));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(handle.is_finished());

    let summary = world.sync.summary(&world.alice.id).await.unwrap();
    assert!(summary.iter().all(|s| s.conversation_id != c));
}

#[tokio::test]
async fn test_spawned_session_polls_and_confirms_echo() {
    let world = World::new().await;
    let c = world.sync.start_im(&world.alice.id, "bob").await.unwrap();
    let mut config = world.config(&world.alice);
    config.poll_interval = Duration::from_millis(20);

    let session = SyncSession::open(world.api(&world.alice), config, &c, KnownChats::new())
        .await
        .unwrap();
    let _handle = session.spawn();

    world.bob_says(&c, "are you there").await;
    session.send_text("yes").await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    let entries = session.entries();
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| e.state == EntryState::Confirmed));
}

#[tokio::test]
async fn test_monitor_notices_for_other_conversations() {
    let world = World::new().await;
    let known = KnownChats::new();
    let api = world.api(&world.alice);
    let c = world.sync.start_im(&world.alice.id, "bob").await.unwrap();

    let session = SyncSession::open(api.clone(), world.config(&world.alice), &c, known.clone())
        .await
        .unwrap();
    let monitor = Arc::new(ConversationMonitor::new(
        api,
        known.clone(),
        Duration::from_secs(10),
    ));
    let mut events = session.subscribe();
    let _notices = session.attach(&monitor);

    let room = world.sync.join_room(&world.bob.id, "lobby", true).await.unwrap();
    world.sync.join_room(&world.alice.id, "lobby", true).await.unwrap();
    monitor.run_cycle().await;
    assert_eq!(next_status(&mut events).await, "New chat started: lobby");

    world.bob_says(&room, "welcome").await;
    monitor.run_cycle().await;
    assert_eq!(next_status(&mut events).await, "New message in lobby");

    // Activity in the open conversation is not announced
    world.bob_says(&c, "hi").await;
    monitor.run_cycle().await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(drain(&mut events)
        .iter()
        .all(|e| !matches!(e, SessionEvent::Status(_))));
}
