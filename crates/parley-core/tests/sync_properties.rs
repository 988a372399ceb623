use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::Duration;

use parley_core::{Clock, ManualClock, SyncConfig, SyncEngine, is_online};
use parley_db::Database;
use parley_types::api::{Caller, Claims, ToggleOutcome};
use uuid::Uuid;

/// File-backed store in the temp dir, removed (with its WAL files) on drop.
struct TempDb {
    path: PathBuf,
}

impl TempDb {
    fn new() -> Self {
        let path = std::env::temp_dir().join(format!("parley-test-{}.db", Uuid::new_v4()));
        Self { path }
    }
}

impl Drop for TempDb {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let mut p = self.path.clone().into_os_string();
            p.push(suffix);
            let _ = std::fs::remove_file(p);
        }
    }
}

fn engine(db: Database, start: i64) -> (Arc<SyncEngine>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(start));
    let engine = SyncEngine::new(Arc::new(db), clock.clone(), SyncConfig::default());
    (Arc::new(engine), clock)
}

fn in_memory() -> (Arc<SyncEngine>, Arc<ManualClock>) {
    engine(Database::open_in_memory().unwrap(), 1_000)
}

/// Ticks by one on every read. When armed, the next read reports on `parked`
/// and waits on `release` before returning its stamp.
#[derive(Default)]
struct GatedClock {
    now: AtomicI64,
    gate: Mutex<Option<(Sender<()>, Receiver<()>)>>,
}

impl GatedClock {
    fn arm(&self) -> (Receiver<()>, Sender<()>) {
        let (parked_tx, parked_rx) = channel();
        let (release_tx, release_rx) = channel();
        *self.gate.lock().unwrap() = Some((parked_tx, release_rx));
        (parked_rx, release_tx)
    }
}

impl Clock for GatedClock {
    fn now_ms(&self) -> i64 {
        let stamp = self.now.fetch_add(1, Ordering::SeqCst) + 1;
        let gate = self.gate.lock().unwrap().take();
        if let Some((parked, release)) = gate {
            parked.send(()).unwrap();
            release.recv().unwrap();
        }
        stamp
    }
}

fn login(engine: &SyncEngine, name: &str) -> Caller {
    engine
        .resolve_caller(&Claims {
            sub: format!("test|{}", name),
            name: name.to_string(),
            picture: None,
            email: None,
            exp: usize::MAX,
        })
        .unwrap()
}

#[test]
fn concurrent_direct_resolution_yields_one_conversation() {
    const CALLS: usize = 16;

    let tmp = TempDb::new();
    let (engine, _clock) = engine(Database::open(&tmp.path).unwrap(), 1_000);
    let alice = login(&engine, "alice");
    let bob = login(&engine, "bob");

    let barrier = Arc::new(Barrier::new(CALLS));
    let handles: Vec<_> = (0..CALLS)
        .map(|i| {
            let engine = engine.clone();
            let barrier = barrier.clone();
            let (me, other) = if i % 2 == 0 {
                (alice.clone(), bob.user_id)
            } else {
                (bob.clone(), alice.user_id)
            };
            thread::spawn(move || {
                barrier.wait();
                engine.get_or_create_direct_conversation(&me, other).unwrap()
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let id = results[0].conversation.id;
    assert!(results.iter().all(|r| r.conversation.id == id));
    assert_eq!(results.iter().filter(|r| r.created).count(), 1);

    let listed = engine.list_conversations(&alice).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, id);
}

#[test]
fn concurrent_identical_toggles_keep_one_reaction_per_user() {
    let tmp = TempDb::new();
    let (engine, _clock) = engine(Database::open(&tmp.path).unwrap(), 1_000);
    let alice = login(&engine, "alice");
    let bob = login(&engine, "bob");
    let conv = engine
        .get_or_create_direct_conversation(&alice, bob.user_id)
        .unwrap()
        .conversation
        .id;

    for toggles in [15usize, 16] {
        let msg = engine.send_message(&alice, conv, "race", None, None).unwrap().message.id;

        let barrier = Arc::new(Barrier::new(toggles));
        let handles: Vec<_> = (0..toggles)
            .map(|_| {
                let engine = engine.clone();
                let barrier = barrier.clone();
                let bob = bob.clone();
                thread::spawn(move || {
                    barrier.wait();
                    engine.toggle_reaction(&bob, msg, "👍").unwrap()
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let reactions = engine.aggregate_reactions(&alice, msg).unwrap();
        let from_bob: usize = reactions
            .iter()
            .map(|g| g.user_ids.iter().filter(|id| **id == bob.user_id).count())
            .sum();
        assert!(from_bob <= 1);
        assert_eq!(from_bob, toggles % 2);
    }
}

#[test]
fn message_committed_after_mark_read_stays_unread() {
    let tmp = TempDb::new();
    let clock = Arc::new(GatedClock::default());
    let engine = Arc::new(SyncEngine::new(
        Arc::new(Database::open(&tmp.path).unwrap()),
        clock.clone(),
        SyncConfig::default(),
    ));
    let alice = login(&engine, "alice");
    let bob = login(&engine, "bob");
    let conv = engine
        .get_or_create_direct_conversation(&alice, bob.user_id)
        .unwrap()
        .conversation
        .id;

    // The sender's timestamp read parks it mid-send
    let (parked, release) = clock.arm();
    let sender = {
        let engine = engine.clone();
        let alice = alice.clone();
        thread::spawn(move || engine.send_message(&alice, conv, "late", None, None).unwrap())
    };
    parked.recv().unwrap();

    let reader = {
        let engine = engine.clone();
        let bob = bob.clone();
        thread::spawn(move || engine.mark_read(&bob, conv).unwrap())
    };
    // The watermark cannot be written while the send is still stamping
    thread::sleep(Duration::from_millis(100));
    assert!(!reader.is_finished());

    release.send(()).unwrap();
    let sent = sender.join().unwrap().message;
    let watermark = reader.join().unwrap();

    assert!(sent.created_at < watermark);
    assert_eq!(engine.unread_count(&bob, conv).unwrap(), 0);

    engine.send_message(&alice, conv, "after", None, None).unwrap();
    assert_eq!(engine.unread_count(&bob, conv).unwrap(), 1);
}

#[test]
fn delete_twice_equals_delete_once() {
    let (engine, clock) = in_memory();
    let alice = login(&engine, "alice");
    let bob = login(&engine, "bob");
    let conv = engine
        .get_or_create_direct_conversation(&alice, bob.user_id)
        .unwrap()
        .conversation
        .id;
    let msg = engine.send_message(&alice, conv, "bye", None, None).unwrap().message.id;

    engine.delete_message(&alice, msg).unwrap();
    let once = engine.list_messages(&alice, conv).unwrap();
    clock.advance(100);
    engine.delete_message(&alice, msg).unwrap();
    let twice = engine.list_messages(&alice, conv).unwrap();

    assert_eq!(once[0].deleted_at, twice[0].deleted_at);
    assert_eq!(once[0].content, twice[0].content);
}

#[test]
fn reaction_sequence_e1_e1_e2_e2_ends_empty() {
    let (engine, _clock) = in_memory();
    let alice = login(&engine, "alice");
    let bob = login(&engine, "bob");
    let conv = engine
        .get_or_create_direct_conversation(&alice, bob.user_id)
        .unwrap()
        .conversation
        .id;
    let msg = engine.send_message(&alice, conv, "nice", None, None).unwrap().message.id;

    let from_bob = |reactions: &[parley_types::api::ReactionGroup]| {
        reactions
            .iter()
            .filter(|g| g.user_ids.contains(&bob.user_id))
            .count()
    };

    let steps = [
        ("👍", ToggleOutcome::Added, 1),
        ("👍", ToggleOutcome::Removed, 0),
        ("😂", ToggleOutcome::Added, 1),
        ("😂", ToggleOutcome::Removed, 0),
    ];
    for (emoji, expected, count) in steps {
        let toggled = engine.toggle_reaction(&bob, msg, emoji).unwrap();
        assert_eq!(toggled.outcome, expected);
        assert_eq!(from_bob(&toggled.reactions), count);
        assert_eq!(from_bob(&engine.aggregate_reactions(&alice, msg).unwrap()), count);
    }
    assert!(engine.aggregate_reactions(&alice, msg).unwrap().is_empty());
}

#[test]
fn unread_count_tracks_mark_read_and_senders() {
    let (engine, clock) = in_memory();
    let alice = login(&engine, "alice");
    let bob = login(&engine, "bob");
    let conv = engine
        .get_or_create_direct_conversation(&alice, bob.user_id)
        .unwrap()
        .conversation
        .id;

    engine.send_message(&alice, conv, "one", None, None).unwrap();
    clock.advance(10);
    engine.mark_read(&bob, conv).unwrap();
    assert_eq!(engine.unread_count(&bob, conv).unwrap(), 0);

    clock.advance(10);
    engine.send_message(&alice, conv, "two", None, None).unwrap();
    assert_eq!(engine.unread_count(&bob, conv).unwrap(), 1);

    clock.advance(10);
    engine.send_message(&bob, conv, "mine", None, None).unwrap();
    assert_eq!(engine.unread_count(&bob, conv).unwrap(), 1);
}

#[test]
fn other_last_read_is_zero_until_everyone_has_read() {
    let (engine, clock) = in_memory();
    let alice = login(&engine, "alice");
    let bob = login(&engine, "bob");
    let carol = login(&engine, "carol");
    let group = engine
        .create_group_conversation(&alice, "trio", &[bob.user_id, carol.user_id])
        .unwrap()
        .id;

    clock.set(5_000);
    engine.mark_read(&alice, group).unwrap();
    engine.mark_read(&bob, group).unwrap();

    assert_eq!(engine.read_status(&alice, group).unwrap().other_last_read_at, 0);
    assert_eq!(engine.read_status(&bob, group).unwrap().other_last_read_at, 0);
    assert_eq!(engine.read_status(&carol, group).unwrap().other_last_read_at, 5_000);
}

#[test]
fn presence_threshold_and_offline() {
    let (engine, clock) = in_memory();
    let alice = login(&engine, "alice");
    let threshold = engine.config().online_threshold_ms;
    assert_eq!(threshold, 15_000);

    clock.set(0);
    engine.heartbeat(&alice).unwrap();
    assert!(engine.is_user_online(alice.user_id, 14_999).unwrap());
    assert!(!engine.is_user_online(alice.user_id, 15_001).unwrap());

    clock.set(100);
    engine.heartbeat(&alice).unwrap();
    engine.set_offline(&alice).unwrap();
    assert!(!engine.is_user_online(alice.user_id, 100).unwrap());
    assert!(!is_online(engine.presence(alice.user_id).unwrap().last_seen, 100, i64::MAX));
}

#[test]
fn end_to_end_read_ticks() {
    let (engine, clock) = in_memory();
    let alice = login(&engine, "alice");
    let bob = login(&engine, "bob");
    let conv = engine
        .get_or_create_direct_conversation(&alice, bob.user_id)
        .unwrap()
        .conversation
        .id;

    clock.set(1_000);
    let hi = engine.send_message(&alice, conv, "hi", None, None).unwrap().message;
    assert_eq!(hi.created_at, 1_000);
    assert_eq!(engine.unread_count(&bob, conv).unwrap(), 1);

    clock.set(1_500);
    let before = engine.read_status(&bob, conv).unwrap().my_last_read_at;
    assert_eq!(before, 0);
    let bob_read_at = engine.mark_read(&bob, conv).unwrap();
    assert_eq!(engine.unread_count(&bob, conv).unwrap(), 0);

    clock.set(2_000);
    let there = engine.send_message(&alice, conv, "there", None, None).unwrap().message;
    assert_eq!(engine.unread_count(&bob, conv).unwrap(), 1);

    let seen_by_other = engine.read_status(&alice, conv).unwrap().other_last_read_at;
    assert_eq!(seen_by_other, bob_read_at);
    assert!(hi.created_at <= seen_by_other);
    assert!(there.created_at > seen_by_other);
}
