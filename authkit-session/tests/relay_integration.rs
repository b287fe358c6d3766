//! Cross-tab behavior of the session relay.
//!
//! Two relays sharing one in-memory area stand in for two tabs of the same
//! origin. Timings use real sleeps with generous margins; the throttle
//! windows are far larger than the test durations, so "exactly once"
//! assertions are stable.

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;

use authkit_core::SessionRecord;
use authkit_session::{
    RelayConfig, SchedulerConfig, SessionChannel, SessionEvent, SessionProbe,
    SessionRelay, SessionValidity,
};
use authkit_store::{MemoryArea, SharedArea, StorageArea};

/// Probe that always reports a comfortably valid session.
struct AlwaysValid;

#[async_trait]
impl SessionProbe for AlwaysValid {
    async fn check(&self) -> SessionValidity {
        SessionValidity::Valid {
            remaining: Duration::from_secs(3600),
        }
    }
}

/// Probe that counts how often it is consulted.
struct CountingProbe {
    checks: AtomicUsize,
}

#[async_trait]
impl SessionProbe for CountingProbe {
    async fn check(&self) -> SessionValidity {
        self.checks.fetch_add(1, Ordering::SeqCst);
        SessionValidity::Valid {
            remaining: Duration::from_secs(3600),
        }
    }
}

fn quiet_config() -> RelayConfig {
    RelayConfig {
        scheduler: SchedulerConfig {
            // Far in the future: these tests exercise observers, not polling.
            initial_delay: Duration::from_secs(3600),
            interval: Duration::from_secs(3600),
            expiry_cutoff: Duration::from_secs(1),
        },
        throttle_window: Duration::from_secs(30),
    }
}

fn spawn_tab(area: &MemoryArea, channel: &SessionChannel) -> SessionRelay {
    SessionRelay::new(
        Arc::new(area.handle()) as Arc<dyn SharedArea>,
        channel,
        quiet_config(),
    )
}

fn count_events(relay: &SessionRelay) -> (Arc<Mutex<Vec<String>>>, authkit_core::Subscription) {
    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let seen_cb = Arc::clone(&seen);
    let subscription = relay.subscribe(move |event| {
        let label = match event {
            SessionEvent::Created(detail) => format!("created:{}", detail.user_id),
            SessionEvent::Expired => "expired".to_string(),
            SessionEvent::LoggedOut => "logged_out".to_string(),
            SessionEvent::UserDeleted => "user_deleted".to_string(),
        };
        seen_cb.lock().unwrap().push(label);
    });
    (seen, subscription)
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn zeroed_expiration_reaches_every_other_tab_exactly_once() {
    let area = MemoryArea::new();
    let channel = SessionChannel::new();
    let tab_a = spawn_tab(&area, &channel);
    let tab_b = spawn_tab(&area, &channel);

    let (seen_a, _sub_a) = count_events(&tab_a);
    let (seen_b, _sub_b) = count_events(&tab_b);
    tab_a.start(Arc::new(AlwaysValid));
    tab_b.start(Arc::new(AlwaysValid));
    settle().await;

    // A third party (e.g. an expired server response handler) zeroes out
    // the record through a raw handle.
    let raw = area.handle();
    let dead = SessionRecord {
        user_id: "u-1".to_string(),
        expiration: 1,
        auth_flow_completed: true,
    };
    raw.set(
        authkit_core::SESSION_STORAGE_KEY,
        &serde_json_record(&dead),
    )
    .unwrap();
    settle().await;

    assert_eq!(seen_a.lock().unwrap().as_slice(), ["expired"]);
    assert_eq!(seen_b.lock().unwrap().as_slice(), ["expired"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn logout_in_one_tab_expires_the_others_once() {
    let area = MemoryArea::new();
    let channel = SessionChannel::new();
    let tab_a = spawn_tab(&area, &channel);
    let tab_b = spawn_tab(&area, &channel);

    // Establish a session first, then only observe the logout.
    let record = SessionRecord::expiring_in("u-1", 3600, true);
    tab_a.announce_created(&record).unwrap();

    let (seen_a, _sub_a) = count_events(&tab_a);
    let (seen_b, _sub_b) = count_events(&tab_b);
    tab_a.start(Arc::new(AlwaysValid));
    tab_b.start(Arc::new(AlwaysValid));
    settle().await;

    // Tab A logs out. Tab B is triggered twice (storage change + channel
    // broadcast) but the throttle collapses that into one notification.
    tab_a.notify_logout().unwrap();
    settle().await;

    assert_eq!(seen_a.lock().unwrap().as_slice(), ["logged_out"]);
    assert_eq!(seen_b.lock().unwrap().as_slice(), ["expired"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn created_session_propagates_with_detail() {
    let area = MemoryArea::new();
    let channel = SessionChannel::new();
    let tab_a = spawn_tab(&area, &channel);
    let tab_b = spawn_tab(&area, &channel);

    let (seen_a, _sub_a) = count_events(&tab_a);
    let (seen_b, _sub_b) = count_events(&tab_b);
    tab_a.start(Arc::new(AlwaysValid));
    tab_b.start(Arc::new(AlwaysValid));
    settle().await;

    let record = SessionRecord::expiring_in("u-42", 3600, true);
    tab_a.announce_created(&record).unwrap();
    settle().await;

    assert_eq!(seen_a.lock().unwrap().as_slice(), ["created:u-42"]);
    assert_eq!(seen_b.lock().unwrap().as_slice(), ["created:u-42"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn each_listener_registration_is_notified_once() {
    let area = MemoryArea::new();
    let channel = SessionChannel::new();
    let tab_a = spawn_tab(&area, &channel);
    let tab_b = spawn_tab(&area, &channel);

    let (first, _sub_1) = count_events(&tab_b);
    let (second, _sub_2) = count_events(&tab_b);
    tab_a.start(Arc::new(AlwaysValid));
    tab_b.start(Arc::new(AlwaysValid));
    settle().await;

    tab_a.announce_expired().unwrap();
    settle().await;

    // One notification per registration, not one per raw trigger.
    assert_eq!(first.lock().unwrap().as_slice(), ["expired"]);
    assert_eq!(second.lock().unwrap().as_slice(), ["expired"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn leadership_moves_to_the_most_recent_starter() {
    let area = MemoryArea::new();
    let channel = SessionChannel::new();

    let polling_config = RelayConfig {
        scheduler: SchedulerConfig {
            initial_delay: Duration::from_millis(10),
            interval: Duration::from_millis(20),
            expiry_cutoff: Duration::from_secs(1),
        },
        throttle_window: Duration::from_secs(30),
    };
    let tab_a = SessionRelay::new(
        Arc::new(area.handle()) as Arc<dyn SharedArea>,
        &channel,
        polling_config,
    );
    let tab_b = SessionRelay::new(
        Arc::new(area.handle()) as Arc<dyn SharedArea>,
        &channel,
        polling_config,
    );

    let probe_a = Arc::new(CountingProbe {
        checks: AtomicUsize::new(0),
    });
    let probe_b = Arc::new(CountingProbe {
        checks: AtomicUsize::new(0),
    });

    tab_a.start(Arc::clone(&probe_a) as Arc<dyn SessionProbe>);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(probe_a.checks.load(Ordering::SeqCst) > 0);

    // Tab B starts and requests leadership; tab A's polling loop stops.
    tab_b.start(Arc::clone(&probe_b) as Arc<dyn SessionProbe>);
    settle().await;
    let frozen_a = probe_a.checks.load(Ordering::SeqCst);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(probe_a.checks.load(Ordering::SeqCst), frozen_a);
    assert!(probe_b.checks.load(Ordering::SeqCst) > 0);
}

fn serde_json_record(record: &SessionRecord) -> String {
    format!(
        "{{\"user_id\":\"{}\",\"expiration\":{},\"auth_flow_completed\":{}}}",
        record.user_id, record.expiration, record.auth_flow_completed
    )
}
