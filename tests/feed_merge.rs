//! End-to-end scenarios for the multi-channel changes feed: merge order,
//! coalescing, backfill flights, wait-mode wakeups, and termination.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam::channel::{Receiver, RecvTimeoutError};

use weir::{
    AccessError, CacheError, ChangeCache, ChangeEntry, ChangeWaiter, ChangesOptions, ChannelGrant,
    CrcBucket, DocumentStore, FeedContext, FeedItem, Limits, LogEntry, Principal, SequenceHasher,
    Sha256Hasher, Terminator, TimedSet, Trigger, VectorClock, WaiterError, WaiterSource,
};

#[derive(Default)]
struct SharedCache {
    logs: Mutex<BTreeMap<String, Vec<LogEntry>>>,
}

impl SharedCache {
    fn with_channel(self, name: &str, entries: Vec<LogEntry>) -> Self {
        self.logs.lock().unwrap().insert(name.to_string(), entries);
        self
    }

    fn push(&self, channel: &str, entry: LogEntry) {
        self.logs
            .lock()
            .unwrap()
            .entry(channel.to_string())
            .or_default()
            .push(entry);
    }
}

impl ChangeCache for SharedCache {
    fn get_changes(
        &self,
        channel: &str,
        options: &ChangesOptions,
    ) -> Result<Vec<LogEntry>, CacheError> {
        let logs = self.logs.lock().unwrap();
        let log = logs.get(channel).cloned().unwrap_or_default();
        if options.since.triggered_by_clock.is_some() {
            // Backfill read: everything, up to and past the frontier.
            return Ok(log);
        }
        Ok(log
            .into_iter()
            .filter(|entry| entry.seq > options.since.clock.get(entry.vb_no))
            .collect())
    }
}

struct FakePrincipal {
    name: String,
    sequence: u64,
    grants: TimedSet,
    pending_grants: Arc<Mutex<Option<TimedSet>>>,
    fail_reload: bool,
}

impl FakePrincipal {
    fn new(name: &str, grants: TimedSet) -> Self {
        Self {
            name: name.to_string(),
            sequence: 0,
            grants,
            pending_grants: Arc::new(Mutex::new(None)),
            fail_reload: false,
        }
    }
}

impl Principal for FakePrincipal {
    fn name(&self) -> &str {
        &self.name
    }

    fn doc_id(&self) -> String {
        format!("_user/{}", self.name)
    }

    fn sequence(&self) -> u64 {
        self.sequence
    }

    fn filter_to_available_channels(&self, requested: &BTreeSet<String>) -> TimedSet {
        self.grants
            .iter()
            .filter(|(name, _)| requested.contains(*name))
            .map(|(name, grant)| (name.clone(), *grant))
            .collect()
    }

    fn inherited_channels(&self) -> BTreeSet<String> {
        self.grants.keys().cloned().collect()
    }

    fn reload(&mut self) -> Result<(), AccessError> {
        if self.fail_reload {
            return Err(AccessError::PrincipalNotFound {
                name: self.name.clone(),
            });
        }
        if let Some(next) = self.pending_grants.lock().unwrap().take() {
            self.grants = next;
        }
        Ok(())
    }
}

struct ScriptedWaiter {
    user_count: Arc<AtomicU64>,
    wakes: VecDeque<Box<dyn FnOnce() -> bool + Send>>,
}

impl ScriptedWaiter {
    fn new(user_count: Arc<AtomicU64>) -> Self {
        Self {
            user_count,
            wakes: VecDeque::new(),
        }
    }

    fn on_wake(mut self, wake: impl FnOnce() -> bool + Send + 'static) -> Self {
        self.wakes.push_back(Box::new(wake));
        self
    }
}

impl ChangeWaiter for ScriptedWaiter {
    fn current_user_count(&self) -> u64 {
        self.user_count.load(Ordering::SeqCst)
    }

    fn update_channels(&mut self, _channels: &TimedSet) {}

    fn wait(&mut self) -> bool {
        match self.wakes.pop_front() {
            Some(wake) => wake(),
            None => false,
        }
    }
}

struct StaticWaiters {
    waiter: Mutex<Option<Box<dyn ChangeWaiter>>>,
}

impl StaticWaiters {
    fn with(waiter: ScriptedWaiter) -> Arc<Self> {
        Arc::new(Self {
            waiter: Mutex::new(Some(Box::new(waiter))),
        })
    }

    fn none() -> Arc<Self> {
        Arc::new(Self {
            waiter: Mutex::new(None),
        })
    }
}

impl WaiterSource for StaticWaiters {
    fn start(&self, _channels: &BTreeSet<String>) -> Result<Box<dyn ChangeWaiter>, WaiterError> {
        self.waiter
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| WaiterError("no waiter scripted".to_string()))
    }
}

/// Fires a terminator while enriching the named entry.
struct FireOn {
    id: &'static str,
    trigger: Mutex<Option<Trigger>>,
}

impl DocumentStore for FireOn {
    fn add_doc_to_entry(&self, entry: &mut ChangeEntry, _include_docs: bool, _conflicts: bool) {
        if entry.id == self.id {
            if let Some(trigger) = self.trigger.lock().unwrap().take() {
                trigger.fire();
            }
        }
    }
}

fn context(cache: Arc<SharedCache>, waiters: Arc<StaticWaiters>) -> FeedContext {
    FeedContext::new(
        cache,
        Arc::new(Sha256Hasher),
        Arc::new(CrcBucket::default()),
        waiters,
    )
}

fn channels(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|name| name.to_string()).collect()
}

fn collect(rx: &Receiver<FeedItem>) -> Vec<FeedItem> {
    let mut items = Vec::new();
    loop {
        match rx.recv_timeout(Duration::from_secs(10)) {
            Ok(item) => items.push(item),
            Err(RecvTimeoutError::Disconnected) => return items,
            Err(RecvTimeoutError::Timeout) => panic!("feed did not close in time"),
        }
    }
}

fn entries(items: &[FeedItem]) -> Vec<&ChangeEntry> {
    items
        .iter()
        .filter_map(|item| match item {
            FeedItem::Entry(entry) => Some(entry.as_ref()),
            FeedItem::Idle => None,
        })
        .collect()
}

fn idle_count(items: &[FeedItem]) -> usize {
    items
        .iter()
        .filter(|item| matches!(item, FeedItem::Idle))
        .count()
}

/// Ordering and at-most-once invariants over one stream's emissions.
fn assert_stream_invariants(entries: &[&ChangeEntry]) {
    for pair in entries.windows(2) {
        assert!(
            !pair[1].seq.before(&pair[0].seq),
            "out of order: {} then {}",
            pair[0].seq,
            pair[1].seq
        );
    }
    let mut seen = BTreeSet::new();
    for entry in entries {
        assert!(
            seen.insert((entry.seq.position(), entry.seq.triggered_by)),
            "duplicate emission at {}",
            entry.seq
        );
    }
}

#[test]
fn simple_merge_across_channels() {
    let cache = Arc::new(
        SharedCache::default()
            .with_channel("A", vec![LogEntry::new("x", 1, 5, "1-x")])
            .with_channel("B", vec![LogEntry::new("y", 2, 3, "1-y")]),
    );
    let rx = context(cache, StaticWaiters::none())
        .multi_changes_feed(channels(&["A", "B"]), ChangesOptions::default())
        .unwrap();

    let items = collect(&rx);
    assert_eq!(idle_count(&items), 0);
    let got = entries(&items);
    assert_stream_invariants(&got);

    let ids: Vec<&str> = got.iter().map(|entry| entry.id.as_str()).collect();
    assert_eq!(ids, vec!["y", "x"]);
    assert_eq!((got[0].seq.vb_no, got[0].seq.seq), (2, 3));
    assert_eq!((got[1].seq.vb_no, got[1].seq.seq), (1, 5));
    for entry in &got {
        assert!(!entry.seq.clock.hashed_value().is_empty());
    }
}

#[test]
fn coincident_sequences_coalesce_with_removed_union() {
    let cache = Arc::new(
        SharedCache::default()
            .with_channel(
                "A",
                vec![LogEntry::new("z", 1, 7, "2-z").with_flags(LogEntry::REMOVED)],
            )
            .with_channel(
                "B",
                vec![LogEntry::new("z", 1, 7, "2-z").with_flags(LogEntry::REMOVED)],
            ),
    );
    let rx = context(cache, StaticWaiters::none())
        .multi_changes_feed(channels(&["A", "B"]), ChangesOptions::default())
        .unwrap();

    let items = collect(&rx);
    let got = entries(&items);
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].id, "z");
    assert_eq!(
        got[0].removed,
        Some(BTreeSet::from(["A".to_string(), "B".to_string()]))
    );
}

#[test]
fn new_grant_backfills_up_to_the_grant() {
    let cache = Arc::new(SharedCache::default().with_channel(
        "C",
        vec![
            LogEntry::new("p", 2, 6, "1-p"),
            LogEntry::new("q", 2, 9, "1-q"),
            LogEntry::new("r", 2, 12, "1-r"),
        ],
    ));
    let principal = FakePrincipal::new(
        "alice",
        TimedSet::from([("C".to_string(), ChannelGrant::new(10, 2))]),
    );
    let mut options = ChangesOptions::default();
    options.since.clock = [(2, 4)].into_iter().collect();

    let rx = context(cache, StaticWaiters::none())
        .with_principal(Box::new(principal))
        .multi_changes_feed(channels(&["C"]), options)
        .unwrap();

    let items = collect(&rx);
    let got = entries(&items);
    assert_stream_invariants(&got);
    let ids: Vec<&str> = got.iter().map(|entry| entry.id.as_str()).collect();
    assert_eq!(ids, vec!["p", "q", "r"]);

    for entry in &got[..2] {
        assert_eq!(entry.seq.triggered_by, 10);
        assert_eq!(entry.seq.triggered_by_vb_no, 2);
        // Backfill containment: at or below the flight's frontier.
        let frontier = entry.seq.triggered_by_clock.as_ref().unwrap();
        assert!(entry.seq.seq <= frontier.get(entry.seq.vb_no));
    }
    assert!(!got[2].seq.is_backfill());

    // One hashed token per flight, shared by its entries; the live entry
    // carries its own.
    let token_p = got[0].seq.triggered_by_clock.as_ref().unwrap().hashed_value();
    let token_q = got[1].seq.triggered_by_clock.as_ref().unwrap().hashed_value();
    assert!(!token_p.is_empty());
    assert_eq!(token_p, token_q);
    assert!(!got[2].seq.clock.hashed_value().is_empty());
}

#[test]
fn resumed_flight_skips_delivered_backfill() {
    let cache = Arc::new(SharedCache::default().with_channel(
        "C",
        vec![
            LogEntry::new("p", 2, 6, "1-p"),
            LogEntry::new("q", 2, 9, "1-q"),
            LogEntry::new("s", 2, 10, "1-s"),
            LogEntry::new("r", 2, 12, "1-r"),
        ],
    ));
    let principal = FakePrincipal::new(
        "alice",
        TimedSet::from([("C".to_string(), ChannelGrant::new(10, 2))]),
    );
    let mut options = ChangesOptions::default();
    options.since.seq = 9;
    options.since.vb_no = 2;
    options.since.clock = [(2, 4)].into_iter().collect();
    options.since.triggered_by = 10;
    options.since.triggered_by_vb_no = 2;
    options.since.triggered_by_clock = Some([(2, 10)].into_iter().collect::<VectorClock>());

    let rx = context(cache, StaticWaiters::none())
        .with_principal(Box::new(principal))
        .multi_changes_feed(channels(&["C"]), options)
        .unwrap();

    let items = collect(&rx);
    let got = entries(&items);
    assert_stream_invariants(&got);
    let ids: Vec<&str> = got.iter().map(|entry| entry.id.as_str()).collect();
    assert_eq!(ids, vec!["s", "r"]);
    assert_eq!(got[0].seq.triggered_by, 10);
    assert!(!got[1].seq.is_backfill());
}

#[test]
fn continuous_feed_parks_and_wakes() {
    let cache = Arc::new(SharedCache::default());
    let wake_cache = Arc::clone(&cache);
    let waiter = ScriptedWaiter::new(Arc::new(AtomicU64::new(0))).on_wake(move || {
        wake_cache.push("A", LogEntry::new("a", 1, 1, "1-a"));
        true
    });

    let mut options = ChangesOptions::default();
    options.wait = true;
    options.continuous = true;

    let rx = context(cache, StaticWaiters::with(waiter))
        .multi_changes_feed(channels(&["A"]), options)
        .unwrap();

    let items = collect(&rx);
    assert!(matches!(items[0], FeedItem::Idle));
    match &items[1] {
        FeedItem::Entry(entry) => assert_eq!(entry.id, "a"),
        FeedItem::Idle => panic!("expected the woken entry"),
    }
    assert!(matches!(items[2], FeedItem::Idle));
    assert_eq!(items.len(), 3);
}

#[test]
fn long_poll_returns_after_first_delivery() {
    let cache = Arc::new(SharedCache::default());
    let wake_cache = Arc::clone(&cache);
    let waiter = ScriptedWaiter::new(Arc::new(AtomicU64::new(0))).on_wake(move || {
        wake_cache.push("A", LogEntry::new("a", 1, 1, "1-a"));
        true
    });

    let mut options = ChangesOptions::default();
    options.wait = true;

    let rx = context(cache, StaticWaiters::with(waiter))
        .multi_changes_feed(channels(&["A"]), options)
        .unwrap();

    let items = collect(&rx);
    assert_eq!(idle_count(&items), 1);
    let got = entries(&items);
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].id, "a");
}

#[test]
fn terminator_stops_a_flight_mid_stream() {
    let cache = Arc::new(SharedCache::default().with_channel(
        "C",
        vec![
            LogEntry::new("p", 2, 6, "1-p"),
            LogEntry::new("q", 2, 9, "1-q"),
            LogEntry::new("r", 2, 12, "1-r"),
        ],
    ));
    let principal = FakePrincipal::new(
        "alice",
        TimedSet::from([("C".to_string(), ChannelGrant::new(10, 2))]),
    );
    let (trigger, terminator) = Terminator::new();

    let mut options = ChangesOptions::default();
    options.since.clock = [(2, 4)].into_iter().collect();
    options.include_docs = true;
    options.terminator = terminator;

    // Output queue of depth 1 and a trigger fired while enriching `q`: the
    // merger delivers `p`, then observes the terminator instead of
    // blocking on the full queue.
    let limits = Limits {
        output_queue_entries: 1,
        ..Limits::default()
    };
    let rx = context(cache, StaticWaiters::none())
        .with_principal(Box::new(principal))
        .with_docs(Arc::new(FireOn {
            id: "q",
            trigger: Mutex::new(Some(trigger)),
        }))
        .with_limits(limits)
        .multi_changes_feed(channels(&["C"]), options)
        .unwrap();

    let items = collect(&rx);
    let got = entries(&items);
    let ids: Vec<&str> = got.iter().map(|entry| entry.id.as_str()).collect();
    assert_eq!(ids, vec!["p"]);
    assert!(got.iter().all(|entry| entry.err.is_none()));
}

#[test]
fn limit_bounds_delivered_entries() {
    let cache = Arc::new(
        SharedCache::default()
            .with_channel("A", vec![LogEntry::new("x", 1, 5, "1-x")])
            .with_channel("B", vec![LogEntry::new("y", 2, 3, "1-y")]),
    );
    let mut options = ChangesOptions::default();
    options.limit = 1;
    let rx = context(cache, StaticWaiters::none())
        .multi_changes_feed(channels(&["A", "B"]), options)
        .unwrap();

    let items = collect(&rx);
    let got = entries(&items);
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].id, "y");
}

#[test]
fn changed_principal_document_emits_user_entry() {
    let cache = Arc::new(SharedCache::default());
    let mut principal = FakePrincipal::new("alice", TimedSet::new());
    principal.sequence = 8;

    let rx = context(cache, StaticWaiters::none())
        .with_principal(Box::new(principal))
        .multi_changes_feed(channels(&["A"]), ChangesOptions::default())
        .unwrap();

    let items = collect(&rx);
    let got = entries(&items);
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].id, "_user/alice");
    assert_eq!(got[0].seq.seq, 8);
    assert!(!got[0].seq.clock.hashed_value().is_empty());
}

#[test]
fn mid_stream_grant_starts_a_backfill_flight() {
    let cache = Arc::new(
        SharedCache::default()
            .with_channel("A", vec![LogEntry::new("a", 1, 5, "1-a")])
            .with_channel(
                "B",
                vec![
                    LogEntry::new("p", 2, 3, "1-p"),
                    LogEntry::new("q", 2, 9, "1-q"),
                    LogEntry::new("r", 2, 12, "1-r"),
                ],
            ),
    );
    let principal = FakePrincipal::new(
        "alice",
        TimedSet::from([("A".to_string(), ChannelGrant::new(0, 1))]),
    );
    let pending = Arc::clone(&principal.pending_grants);

    let user_count = Arc::new(AtomicU64::new(0));
    let wake_count = Arc::clone(&user_count);
    let waiter = ScriptedWaiter::new(Arc::clone(&user_count)).on_wake(move || {
        *pending.lock().unwrap() = Some(TimedSet::from([
            ("A".to_string(), ChannelGrant::new(0, 1)),
            ("B".to_string(), ChannelGrant::new(9, 2)),
        ]));
        wake_count.fetch_add(1, Ordering::SeqCst);
        true
    });

    let mut options = ChangesOptions::default();
    options.wait = true;
    options.continuous = true;

    let rx = context(cache, StaticWaiters::with(waiter))
        .with_principal(Box::new(principal))
        .multi_changes_feed(channels(&["A", "B"]), options)
        .unwrap();

    let items = collect(&rx);
    let got = entries(&items);
    assert_stream_invariants(&got);

    let positions: Vec<(&str, u64)> = got
        .iter()
        .map(|entry| (entry.id.as_str(), entry.seq.triggered_by))
        .collect();
    assert_eq!(
        positions,
        vec![("a", 0), ("p", 9), ("q", 9), ("r", 0)]
    );
    // Live delivery on A already advanced the cursor; the flight's
    // frontier carries both the cursor and the grant.
    let frontier = got[1].seq.triggered_by_clock.as_ref().unwrap();
    assert_eq!(frontier.get(1), 5);
    assert_eq!(frontier.get(2), 9);
    assert_eq!(idle_count(&items), 2);
}

#[test]
fn principal_reload_failure_emits_error_entry() {
    let cache = Arc::new(SharedCache::default());
    let mut principal = FakePrincipal::new("alice", TimedSet::new());
    principal.fail_reload = true;

    let user_count = Arc::new(AtomicU64::new(0));
    let wake_count = Arc::clone(&user_count);
    let waiter = ScriptedWaiter::new(Arc::clone(&user_count)).on_wake(move || {
        wake_count.fetch_add(1, Ordering::SeqCst);
        true
    });

    let mut options = ChangesOptions::default();
    options.wait = true;

    let rx = context(cache, StaticWaiters::with(waiter))
        .with_principal(Box::new(principal))
        .multi_changes_feed(channels(&["A"]), options)
        .unwrap();

    let items = collect(&rx);
    assert!(matches!(items[0], FeedItem::Idle));
    let got = entries(&items);
    assert_eq!(got.len(), 1);
    assert!(got[0].err.is_some());
}

#[test]
fn wait_without_a_waiter_source_fails_synchronously() {
    let cache = Arc::new(SharedCache::default());
    let mut options = ChangesOptions::default();
    options.wait = true;
    let err = context(cache, StaticWaiters::none())
        .multi_changes_feed(channels(&["A"]), options)
        .unwrap_err();
    assert!(matches!(err, weir::Error::Waiter(_)));
}

#[test]
fn hasher_trait_objects_are_interchangeable() {
    // The default hasher is deterministic across instances, so cursors
    // hash identically wherever they are recomputed.
    let clock: VectorClock = [(1, 5), (2, 3)].into_iter().collect();
    let a: Box<dyn SequenceHasher> = Box::new(Sha256Hasher);
    assert_eq!(a.hash(&clock).unwrap(), Sha256Hasher.hash(&clock).unwrap());
}
