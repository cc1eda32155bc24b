//! Integration tests for nodes talking through an in-process hub.
//!
//! Every test builds its own [`MemoryHub`], so tests are independent and
//! need no network.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use murmur_auth::{Authenticator, CURVE_ALLOW_ANY};
use murmur_cert::Certificate;
use murmur_crypto::password::{hash_password_with, PasswordHashParams};
use murmur_event::{Criteria, Event, EventType};
use murmur_node::{wait, MemoryHub, Node, NodeConfig, Poller};
use murmur_types::headers::HeaderKey;
use murmur_types::MurmurError;

type TestResult = Result<(), Box<dyn std::error::Error>>;

const PATIENCE: Duration = Duration::from_secs(2);

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

static COUNTER: AtomicU32 = AtomicU32::new(0);

/// Returns a unique temporary directory for each test.
fn temp_dir() -> PathBuf {
    let id = COUNTER.fetch_add(1, Ordering::SeqCst);
    let dir = std::env::temp_dir().join(format!(
        "murmur-node-test-{}-{}-{}",
        std::process::id(),
        id,
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0),
    ));
    let _ = std::fs::create_dir_all(&dir);
    dir
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("murmur_node=debug,murmur_auth=debug")
        .with_test_writer()
        .try_init();
}

fn named(hub: &Arc<MemoryHub>, name: &str) -> Result<Node, MurmurError> {
    Node::new(hub.clone(), &NodeConfig::named(name))
}

fn on_host(hub: &Arc<MemoryHub>, name: &str, host: &str) -> Result<Node, MurmurError> {
    let config = NodeConfig {
        host: host.into(),
        ..NodeConfig::named(name)
    };
    Node::new(hub.clone(), &config)
}

/// Hashes with cheap Argon2 costs to keep tests fast.
fn hashed(password: &str) -> Result<String, MurmurError> {
    let params = PasswordHashParams {
        m_cost: 256,
        t_cost: 1,
        p_cost: 1,
    };
    hash_password_with(password, &params)
}

fn types(events: &[Event]) -> Vec<EventType> {
    events.iter().map(Event::event_type).collect()
}

// ===========================================================================
// Groups and messaging
// ===========================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shout_reaches_group_member() -> TestResult {
    init_tracing();
    let hub = MemoryHub::shared();
    let alpha = named(&hub, "alpha")?;
    let beta = named(&hub, "beta")?;
    alpha.join("G")?;
    beta.join("G")?;
    alpha.start()?;
    beta.start()?;

    let mut skipped = Vec::new();
    let joined = alpha
        .wait_for(
            "JOIN",
            &Criteria::new().peer_uuid(beta.uuid()),
            Some(PATIENCE),
            |e| skipped.push(e),
        )
        .await?
        .ok_or("beta never joined")?;
    assert_eq!(joined.group(), Some("G"));
    assert_eq!(joined.peer_name(), "beta");
    assert_eq!(types(&skipped), vec![EventType::Enter]);
    assert_eq!(skipped[0].peer_addr(), Some(beta.endpoint()));

    beta.shout("G", "hello")?;
    let shout = alpha
        .wait_for("shout", &Criteria::new().group("G"), Some(PATIENCE), |e| {
            skipped.push(e)
        })
        .await?
        .ok_or("no shout")?;
    assert_eq!(shout.peer_uuid(), beta.uuid());
    assert_eq!(shout.message_text().as_deref(), Some("hello"));
    assert_eq!(skipped.len(), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn skipped_events_arrive_in_order() -> TestResult {
    let hub = MemoryHub::shared();
    let alpha = named(&hub, "alpha")?;
    let beta = named(&hub, "beta")?;
    alpha.join("two")?;
    alpha.start()?;
    beta.start()?;

    beta.join("one")?;
    beta.join("two")?;
    beta.shout("two", "payload")?;

    let mut skipped = Vec::new();
    let found = alpha
        .wait_for(
            "SHOUT",
            &Criteria::new().message("payload"),
            None,
            |e| skipped.push(e),
        )
        .await?;
    assert!(found.is_some());
    assert_eq!(
        types(&skipped),
        vec![EventType::Enter, EventType::Join, EventType::Join]
    );
    assert_eq!(skipped[1].group(), Some("one"));
    assert_eq!(skipped[2].group(), Some("two"));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn whisper_carries_all_frames() -> TestResult {
    let hub = MemoryHub::shared();
    let alpha = named(&hub, "alpha")?;
    let beta = named(&hub, "beta")?;
    alpha.start()?;
    beta.start()?;

    alpha.whisper_frames(beta.uuid(), vec![b"one".to_vec(), b"two".to_vec()])?;
    let whisper = beta
        .wait_for_event("WHISPER", &Criteria::new().peer_uuid(alpha.uuid()), Some(PATIENCE))
        .await?
        .ok_or("no whisper")?;
    assert!(whisper.is_multipart());
    assert_eq!(whisper.message(), Some(&b"one"[..]));
    assert_eq!(whisper.multipart_message(), &[b"one".to_vec(), b"two".to_vec()]);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn headers_reach_peers() -> TestResult {
    let hub = MemoryHub::shared();
    let alpha = named(&hub, "alpha")?;
    alpha.set_header(HeaderKey::symbolic("x_role"), "relay")?;
    alpha.set_headers([("X-Version", 3)])?;
    alpha.start()?;

    let beta = named(&hub, "beta")?;
    beta.start()?;
    let enter = beta
        .wait_for_event("ENTER", &Criteria::new().header("X-role", "relay"), Some(PATIENCE))
        .await?
        .ok_or("no enter")?;
    assert_eq!(enter.header("X-Version"), Some("3"));
    assert_eq!(beta.peer_header_value(alpha.uuid(), "X-role").as_deref(), Some("relay"));
    assert_eq!(beta.peer_address(alpha.uuid()).as_deref(), Some(alpha.endpoint()));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn lowest_contester_becomes_leader() -> TestResult {
    let hub = MemoryHub::shared();
    let alpha = named(&hub, "alpha")?;
    let beta = named(&hub, "beta")?;
    for node in [&alpha, &beta] {
        node.join("G")?;
        node.contest("G")?;
        node.start()?;
    }

    let expected = alpha.uuid().min(beta.uuid());
    let criteria = Criteria::new().group("G").peer_uuid(expected);
    for node in [&alpha, &beta] {
        let leader = node.wait_for_event("LEADER", &criteria, Some(PATIENCE)).await?;
        assert!(leader.is_some(), "{} missed the election", node.name());
    }
    assert_eq!(hub.leader("G"), Some(expected));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn departure_is_announced() -> TestResult {
    let hub = MemoryHub::shared();
    let alpha = named(&hub, "alpha")?;
    let beta = named(&hub, "beta")?;
    alpha.start()?;
    beta.join("G")?;
    beta.start()?;

    hub.report_evasive(beta.uuid())?;
    hub.report_silent(beta.uuid())?;
    beta.stop();

    let mut seen = Vec::new();
    let exit = alpha
        .wait_for("EXIT", &Criteria::new(), Some(PATIENCE), |e| seen.push(e))
        .await?;
    assert!(exit.is_some());
    assert_eq!(
        types(&seen),
        vec![
            EventType::Enter,
            EventType::Join,
            EventType::Evasive,
            EventType::Silent,
            EventType::Leave,
        ]
    );
    assert!(alpha.peers().is_empty());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unresponsive_peer_times_out() -> TestResult {
    init_tracing();
    let hub = MemoryHub::shared();
    let sweeper = hub.spawn_sweeper();

    let config = NodeConfig {
        name: Some("alpha".into()),
        evasive_timeout_ms: 100,
        silent_timeout_ms: 200,
        expired_timeout_ms: 400,
        interval_ms: 20,
        ..NodeConfig::default()
    };
    let alpha = Node::new(hub.clone(), &config)?;
    alpha.start()?;
    let beta = named(&hub, "beta")?;
    beta.join("G")?;
    beta.start()?;

    let mut seen = Vec::new();
    let exit = alpha
        .wait_for(
            "EXIT",
            &Criteria::new().peer_uuid(beta.uuid()),
            Some(PATIENCE),
            |e| seen.push(e),
        )
        .await?;
    sweeper.abort();

    assert!(exit.is_some());
    assert_eq!(
        types(&seen),
        vec![
            EventType::Enter,
            EventType::Join,
            EventType::Evasive,
            EventType::Silent,
            EventType::Leave,
        ]
    );
    assert!(alpha.peers().is_empty());
    assert_eq!(beta.peers(), vec![alpha.uuid()]);
    Ok(())
}

// ===========================================================================
// Waiting
// ===========================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn wait_for_times_out() -> TestResult {
    let hub = MemoryHub::shared();
    let lonely = named(&hub, "lonely")?;
    lonely.start()?;

    let started = Instant::now();
    let result = lonely
        .wait_for_event("JOIN", &Criteria::new(), Some(Duration::from_millis(500)))
        .await?;
    let elapsed = started.elapsed();
    assert!(result.is_none());
    assert!(elapsed >= Duration::from_millis(450), "returned after {elapsed:?}");
    assert!(elapsed < PATIENCE, "returned after {elapsed:?}");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn zero_timeout_checks_once() -> TestResult {
    let hub = MemoryHub::shared();
    let alpha = named(&hub, "alpha")?;
    let beta = named(&hub, "beta")?;
    alpha.start()?;
    beta.start()?;

    let mut skipped = 0;
    let result = alpha
        .wait_for("LEADER", &Criteria::new(), Some(Duration::ZERO), |_| skipped += 1)
        .await?;
    assert!(result.is_none());
    assert_eq!(skipped, 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unknown_type_consumes_nothing() -> TestResult {
    let hub = MemoryHub::shared();
    let alpha = named(&hub, "alpha")?;
    let beta = named(&hub, "beta")?;
    alpha.start()?;
    beta.start()?;

    let result = alpha
        .wait_for("TELEPORT", &Criteria::new(), Some(PATIENCE), |_| {})
        .await;
    assert!(matches!(result, Err(MurmurError::UnknownEventType { name }) if name == "TELEPORT"));

    let next = alpha.try_recv()?.ok_or("ENTER was consumed")?;
    assert_eq!(next.event_type(), EventType::Enter);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_wakes_blocked_receiver() -> TestResult {
    let hub = MemoryHub::shared();
    let node = Arc::new(named(&hub, "alpha")?);
    node.start()?;

    let receiver = {
        let node = Arc::clone(&node);
        tokio::spawn(async move { node.recv().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    node.stop();

    let event = tokio::time::timeout(PATIENCE, receiver).await???;
    assert_eq!(event.event_type(), EventType::Stop);
    assert_eq!(event.peer_uuid(), node.uuid());
    assert!(matches!(node.recv().await, Err(MurmurError::HangUp)));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn event_stream_ends_on_hang_up() -> TestResult {
    let hub = MemoryHub::shared();
    let alpha = named(&hub, "alpha")?;
    let beta = named(&hub, "beta")?;
    alpha.start()?;
    beta.start()?;
    beta.stop();
    alpha.stop();

    let events: Vec<Event> = alpha.events().collect().await;
    assert_eq!(
        types(&events),
        vec![EventType::Enter, EventType::Exit, EventType::Stop]
    );
    assert_eq!(alpha.events().count().await, 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn poller_reports_node_with_traffic() -> TestResult {
    let hub = MemoryHub::shared();
    let alpha = named(&hub, "alpha")?;
    let beta = named(&hub, "beta")?;
    alpha.start()?;
    beta.start()?;
    while alpha.try_recv()?.is_some() {}
    while beta.try_recv()?.is_some() {}

    let poller = Poller::new([&alpha, &beta]);
    assert!(poller.wait(Some(Duration::from_millis(50))).await.is_empty());

    let (ready, sent) = tokio::join!(poller.wait(Some(PATIENCE)), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        alpha.whisper(beta.uuid(), "ping")
    });
    sent?;
    let ready: Vec<_> = ready.iter().map(|n| n.uuid()).collect();
    assert_eq!(ready, vec![beta.uuid()]);

    let first = wait(&[&alpha, &beta], Some(PATIENCE)).await.ok_or("nothing ready")?;
    assert_eq!(first.uuid(), beta.uuid());
    Ok(())
}

// ===========================================================================
// Admission
// ===========================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rejected_peer_is_not_heard() -> TestResult {
    init_tracing();
    let hub = MemoryHub::shared();
    let guarded = on_host(&hub, "guarded", "10.0.0.1")?;
    let auth = Arc::new(Authenticator::new());
    auth.allow(["10.0.0.2"])?;
    guarded.set_authenticator(auth)?;
    guarded.join("G")?;
    guarded.start()?;

    let friend = on_host(&hub, "friend", "10.0.0.2")?;
    let stranger = on_host(&hub, "stranger", "10.0.0.3")?;
    for node in [&friend, &stranger] {
        node.join("G")?;
        node.start()?;
    }

    stranger.shout("G", "let me in")?;
    friend.shout("G", "hi")?;

    let shout = guarded
        .wait_for_event("SHOUT", &Criteria::new(), Some(PATIENCE))
        .await?
        .ok_or("no shout")?;
    assert_eq!(shout.peer_uuid(), friend.uuid());
    assert_eq!(guarded.peers(), vec![friend.uuid()]);

    // The stranger still hears the guarded node: admission is one-way.
    assert!(stranger.peers().contains(&guarded.uuid()));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn curve_peers_are_admitted() -> TestResult {
    let hub = MemoryHub::shared();
    let guarded = named(&hub, "guarded")?;
    let auth = Arc::new(Authenticator::new());
    auth.enable_curve(CURVE_ALLOW_ANY)?;
    guarded.set_authenticator(auth)?;
    guarded.start()?;

    let keyed = named(&hub, "keyed")?;
    keyed.set_certificate(Certificate::new())?;
    keyed.start()?;
    let anonymous = named(&hub, "anonymous")?;
    anonymous.start()?;

    let enter = guarded
        .wait_for_event("ENTER", &Criteria::new(), Some(PATIENCE))
        .await?
        .ok_or("no enter")?;
    assert_eq!(enter.peer_uuid(), keyed.uuid());
    assert_eq!(guarded.peers(), vec![keyed.uuid()]);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn plain_credentials_from_password_file() -> TestResult {
    let dir = temp_dir();
    let passwords = dir.join("passwords");
    std::fs::write(&passwords, format!("ops:{}\n", hashed("hunter2")?))?;

    let hub = MemoryHub::shared();
    let guarded = named(&hub, "guarded")?;
    let auth = Arc::new(Authenticator::new());
    auth.enable_plain(&passwords)?;
    guarded.set_authenticator(auth)?;
    guarded.start()?;

    let good = named(&hub, "good")?;
    good.set_plain_credentials("ops", "hunter2")?;
    good.start()?;
    let bad = named(&hub, "bad")?;
    bad.set_plain_credentials("ops", "guess")?;
    bad.start()?;

    assert_eq!(guarded.peers(), vec![good.uuid()]);
    Ok(())
}

// ===========================================================================
// Configuration
// ===========================================================================

#[test]
fn node_from_config_file() -> TestResult {
    let path = temp_dir().join("node.json");
    std::fs::write(
        &path,
        r#"{ "name": "relay", "host": "10.0.0.5", "port": 5670, "headers": { "X-Role": "relay" } }"#,
    )?;

    let config = NodeConfig::load_from_file(&path)?;
    let node = Node::new(MemoryHub::shared(), &config)?;
    assert_eq!(node.name(), "relay");
    assert_eq!(node.endpoint(), "tcp://10.0.0.5:5670");
    assert_eq!(node.headers().get("X-Role").map(String::as_str), Some("relay"));
    Ok(())
}

#[test]
fn invalid_config_file_is_rejected() -> TestResult {
    let path = temp_dir().join("node.json");
    std::fs::write(&path, r#"{ "host": "" }"#)?;
    assert!(matches!(
        NodeConfig::load_from_file(&path),
        Err(MurmurError::ConfigError { .. })
    ));
    Ok(())
}
