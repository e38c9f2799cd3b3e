//! Integration tests for the dynconf-config manager.

mod support;

use dynconf_common::test_utils::{init_test_logging, snapshot_fixtures, snapshot_of};
use dynconf_config::{
    load_config, load_dynamic_config, BindError, ConfigKey, ErrorSink, LoadError, Manager,
    ManagerError, ManagerOptions, ManagerState, RefreshError, RefreshSummary, TickOutcome,
};
use std::sync::Arc;
use std::time::Duration;
use support::{BuildCounter, Config1, Config2, ScriptedProvider};
use tokio_test::{assert_err, assert_ok};

fn manager_for(provider: &Arc<ScriptedProvider>) -> (Manager, tokio::sync::mpsc::Receiver<RefreshError>) {
    let (sink, errors) = ErrorSink::channel(16);
    let manager = Manager::new(
        Arc::clone(provider),
        ManagerOptions::default().with_error_sink(sink),
    )
    .unwrap();
    (manager, errors)
}

fn drain(errors: &mut tokio::sync::mpsc::Receiver<RefreshError>) -> Vec<RefreshError> {
    let mut out = Vec::new();
    while let Ok(error) = errors.try_recv() {
        out.push(error);
    }
    out
}

#[test]
fn test_register_is_synchronous() {
    init_test_logging();
    let provider = ScriptedProvider::new(snapshot_fixtures::initial_pair());
    let (manager, _errors) = manager_for(&provider);

    let handle = manager.register_default::<Config1>("config1").unwrap();

    assert_eq!(*handle.get(), Config1 { test: "abc".into() });
    assert_eq!(
        manager.get_config::<Config1, _>("config1").as_deref(),
        Some(&Config1 { test: "abc".into() })
    );
    assert_eq!(manager.state(), ManagerState::Created);
    assert_eq!(provider.fetches(), 0);
}

#[test]
fn test_get_unknown_key_is_none() {
    let provider = ScriptedProvider::new(snapshot_fixtures::initial_pair());
    let (manager, _errors) = manager_for(&provider);

    assert!(manager.get_config::<Config1, _>("never-registered").is_none());
    assert!(manager.get_any("never-registered").is_none());
    assert!(manager.handle::<Config1, _>("never-registered").is_none());
}

#[test]
fn test_failed_registration_is_returned_to_caller() {
    let provider = ScriptedProvider::new(snapshot_of(&[("TEST1", "ab")]));
    let (manager, _errors) = manager_for(&provider);

    let err = manager.register_default::<Config1>("config1").unwrap_err();
    match err {
        ManagerError::Registration { key, source } => {
            assert_eq!(key, ConfigKey::from("config1"));
            assert!(matches!(source, BindError::Invalid(_)));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(manager.get_any("config1").is_none());

    let err = manager.register_default::<Config2>("config2").unwrap_err();
    assert!(err.to_string().contains("TEST2"));
}

#[test]
fn test_init_error_is_fatal() {
    struct Broken;

    #[async_trait::async_trait]
    impl dynconf_config::Provider for Broken {
        fn config(&self) -> Result<dynconf_config::Snapshot, dynconf_config::ProviderError> {
            Err(dynconf_config::ProviderError::NotFound("/etc/app.env".into()))
        }

        async fn fetch_config(&self) -> Result<dynconf_config::Snapshot, dynconf_config::ProviderError> {
            unreachable!("never fetched")
        }
    }

    let err = Manager::new(Broken, ManagerOptions::default()).unwrap_err();
    assert!(matches!(err, ManagerError::Init(_)));
    assert!(err.to_string().contains("/etc/app.env"));
}

#[test]
fn test_invalid_options_are_rejected() {
    let provider = ScriptedProvider::new(snapshot_fixtures::initial_pair());
    let err = Manager::new(
        Arc::clone(&provider),
        ManagerOptions::default().with_fetch_interval(Duration::ZERO),
    )
    .unwrap_err();
    assert!(matches!(err, ManagerError::InvalidOptions(_)));
}

#[tokio::test]
async fn test_identical_snapshot_rebuilds_once() {
    let provider = ScriptedProvider::new(snapshot_fixtures::initial_pair());
    let (manager, mut errors) = manager_for(&provider);
    let builds = BuildCounter::default();
    manager.register_config("config1", builds.factory()).unwrap();
    assert_eq!(builds.get(), 1);

    // same content as the initial snapshot
    assert_eq!(manager.refresh_now().await.unwrap(), TickOutcome::Unchanged);
    assert_eq!(builds.get(), 1);

    provider.set_next(snapshot_fixtures::updated_pair());
    assert_eq!(
        manager.refresh_now().await.unwrap(),
        TickOutcome::Refreshed(RefreshSummary { updated: 1, failed: 0 })
    );
    assert_eq!(builds.get(), 2);

    assert_eq!(manager.refresh_now().await.unwrap(), TickOutcome::Unchanged);
    assert_eq!(builds.get(), 2);
    assert_eq!(manager.generation(), 1);
    assert!(drain(&mut errors).is_empty());
}

#[tokio::test]
async fn test_refresh_updates_every_key() {
    let provider = ScriptedProvider::new(snapshot_fixtures::initial_pair());
    let (manager, _errors) = manager_for(&provider);
    let one = manager.register_default::<Config1>("config1").unwrap();
    let two = manager.register_default::<Config2>("config2").unwrap();

    provider.set_next(snapshot_fixtures::updated_pair());
    manager.refresh_now().await.unwrap();

    let snapshot = manager.snapshot();
    assert_eq!(Some(one.get().test.as_str()), snapshot.get("TEST1"));
    assert_eq!(Some(two.get().test.as_str()), snapshot.get("TEST2"));
}

#[tokio::test]
async fn test_failure_isolation_between_keys() {
    let provider = ScriptedProvider::new(snapshot_fixtures::initial_pair());
    let (manager, mut errors) = manager_for(&provider);
    let one = manager.register_default::<Config1>("config1").unwrap();
    let two = manager.register_default::<Config2>("config2").unwrap();

    // "no" violates Config1's length rule
    provider.set_next(snapshot_of(&[("TEST1", "no"), ("TEST2", "def1")]));
    let outcome = manager.refresh_now().await.unwrap();

    assert_eq!(
        outcome,
        TickOutcome::Refreshed(RefreshSummary { updated: 1, failed: 1 })
    );
    assert_eq!(one.get().test, "abc");
    assert_eq!(two.get().test, "def1");
    // the snapshot swap stays committed
    assert_eq!(manager.snapshot().get("TEST1"), Some("no"));

    let reported = drain(&mut errors);
    assert_eq!(reported.len(), 1);
    assert!(matches!(&reported[0], RefreshError::Bind { key, .. } if key.as_str() == "config1"));

    // fixing the upstream value heals the key on the next change
    provider.set_next(snapshot_of(&[("TEST1", "abc2"), ("TEST2", "def1")]));
    manager.refresh_now().await.unwrap();
    assert_eq!(one.get().test, "abc2");
}

#[tokio::test]
async fn test_fetch_error_changes_nothing() {
    let provider = ScriptedProvider::new(snapshot_fixtures::initial_pair());
    let (manager, mut errors) = manager_for(&provider);
    let one = manager.register_default::<Config1>("config1").unwrap();
    let before = manager.snapshot();

    provider.fail_next("backend unavailable");
    assert_eq!(manager.refresh_now().await.unwrap(), TickOutcome::FetchFailed);

    assert_eq!(*manager.snapshot(), *before);
    assert_eq!(manager.generation(), 0);
    assert_eq!(one.get().test, "abc");

    let reported = drain(&mut errors);
    assert_eq!(reported.len(), 1);
    assert!(matches!(&reported[0], RefreshError::Fetch(_)));
    assert!(reported[0].to_string().contains("backend unavailable"));
}

#[tokio::test(start_paused = true)]
async fn test_slow_fetch_times_out() {
    let provider = ScriptedProvider::new(snapshot_fixtures::initial_pair());
    let (sink, mut errors) = ErrorSink::channel(4);
    let manager = Manager::new(
        Arc::clone(&provider),
        ManagerOptions::default()
            .with_fetch_timeout(Duration::from_secs(2))
            .with_error_sink(sink),
    )
    .unwrap();

    provider.set_next(snapshot_fixtures::updated_pair());
    provider.set_delay(Duration::from_secs(30));
    assert_eq!(manager.refresh_now().await.unwrap(), TickOutcome::FetchFailed);
    assert_eq!(manager.generation(), 0);

    let reported = drain(&mut errors);
    assert_eq!(reported.len(), 1);
    assert!(matches!(reported[0], RefreshError::Timeout(d) if d == Duration::from_secs(2)));
}

#[tokio::test(start_paused = true)]
async fn test_background_loop_refreshes_on_interval() {
    let provider = ScriptedProvider::new(snapshot_fixtures::initial_pair());
    let (manager, _errors) = manager_for(&provider);
    let one = manager.register_default::<Config1>("config1").unwrap();
    manager.start().unwrap();
    assert_eq!(manager.state(), ManagerState::Started);

    provider.set_next(snapshot_fixtures::updated_pair());

    // nothing happens before the first interval has elapsed
    tokio::time::sleep(Duration::from_secs(9)).await;
    assert_eq!(provider.fetches(), 0);
    assert_eq!(one.get().test, "abc");

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(provider.fetches(), 1);
    assert_eq!(one.get().test, "abc1");

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(provider.fetches(), 2);
    assert_eq!(manager.generation(), 1);

    manager.close().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_no_fetch_after_close() {
    let provider = ScriptedProvider::new(snapshot_fixtures::initial_pair());
    let (manager, _errors) = manager_for(&provider);
    manager.start().unwrap();

    tokio::time::sleep(Duration::from_secs(25)).await;
    let seen = provider.fetches();
    assert_eq!(seen, 2);

    manager.close().unwrap();
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(provider.fetches(), seen);
    assert_eq!(manager.state(), ManagerState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_close_stops_a_tick_queued_behind_refresh_now() {
    let provider = ScriptedProvider::new(snapshot_fixtures::initial_pair());
    provider.set_delay(Duration::from_secs(3));
    let (manager, _errors) = manager_for(&provider);
    let manager = Arc::new(manager);
    manager.start().unwrap();

    tokio::time::sleep(Duration::from_secs(9)).await;
    let manual = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.refresh_now().await })
    };

    // the timer fires at t=10 and waits for the manual fetch to finish
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(provider.fetches(), 1);
    manager.close().unwrap();

    // the fetch that was already running completes normally
    assert_eq!(manual.await.unwrap().unwrap(), TickOutcome::Unchanged);
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(provider.fetches(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_refresh_now_queued_at_close_is_refused() {
    let provider = ScriptedProvider::new(snapshot_fixtures::initial_pair());
    provider.set_delay(Duration::from_secs(3));
    let (manager, _errors) = manager_for(&provider);
    let manager = Arc::new(manager);

    let first = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.refresh_now().await })
    };
    tokio::time::sleep(Duration::from_secs(1)).await;
    let second = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.refresh_now().await })
    };
    tokio::time::sleep(Duration::from_secs(1)).await;

    manager.close().unwrap();
    assert_eq!(first.await.unwrap().unwrap(), TickOutcome::Unchanged);
    assert!(matches!(second.await.unwrap(), Err(ManagerError::Closed)));
    assert_eq!(provider.fetches(), 1);
}

#[tokio::test]
async fn test_lifecycle_errors() {
    let provider = ScriptedProvider::new(snapshot_fixtures::initial_pair());
    let (manager, _errors) = manager_for(&provider);

    assert_ok!(manager.start());
    assert!(matches!(manager.start(), Err(ManagerError::AlreadyStarted)));

    assert_ok!(manager.close());
    assert!(matches!(manager.close(), Err(ManagerError::AlreadyClosed)));
    assert!(matches!(manager.start(), Err(ManagerError::Closed)));
    assert!(matches!(
        manager.register_default::<Config1>("late"),
        Err(ManagerError::Closed)
    ));
    assert!(matches!(manager.refresh_now().await, Err(ManagerError::Closed)));
    assert_err!(manager.refresh_now().await);
}

#[tokio::test]
async fn test_close_before_start() {
    let provider = ScriptedProvider::new(snapshot_fixtures::initial_pair());
    let (manager, _errors) = manager_for(&provider);

    assert_ok!(manager.close());
    assert!(matches!(manager.shutdown().await, Err(ManagerError::AlreadyClosed)));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_waits_for_refresher() {
    let provider = ScriptedProvider::new(snapshot_fixtures::initial_pair());
    let (manager, _errors) = manager_for(&provider);
    manager.start().unwrap();

    assert_ok!(manager.shutdown().await);
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(provider.fetches(), 0);
}

#[test]
fn test_load_config_once() {
    let provider = ScriptedProvider::new(snapshot_fixtures::initial_pair());
    let config: Config2 = load_config(provider.as_ref()).unwrap();
    assert_eq!(config.test, "def");

    let provider = ScriptedProvider::new(snapshot_of(&[("TEST1", "x")]));
    let err = load_config::<Config1, _>(provider.as_ref()).unwrap_err();
    assert!(matches!(err, LoadError::Bind(BindError::Invalid(_))));
}

#[tokio::test]
async fn test_load_dynamic_config_per_type() {
    let provider = ScriptedProvider::new(snapshot_fixtures::initial_pair());
    let (manager, _errors) = manager_for(&provider);

    let getter = load_dynamic_config::<Config2>(&manager).unwrap();
    assert_eq!(getter.key(), &ConfigKey::of::<Config2>());
    assert_eq!(getter.get().test, "def");

    provider.set_next(snapshot_fixtures::updated_pair());
    manager.refresh_now().await.unwrap();
    assert_eq!(getter.get().test, "def1");
}

#[test]
fn test_reregistration_last_write_wins() {
    let provider = ScriptedProvider::new(snapshot_fixtures::initial_pair());
    let (manager, _errors) = manager_for(&provider);

    let first = manager.register_default::<Config1>("slot").unwrap();
    let builds = BuildCounter::default();
    let second = manager.register_config("slot", builds.factory()).unwrap();

    assert_eq!(builds.get(), 1);
    assert_eq!(manager.registered_keys(), vec![ConfigKey::from("slot")]);
    // both handles read the same slot
    assert!(Arc::ptr_eq(&first.get(), &second.get()));

    // a new target type replaces the slot; the old handles keep their value
    let third = manager.register_default::<Config2>("slot").unwrap();
    assert_eq!(third.get().test, "def");
    assert_eq!(manager.registered_keys(), vec![ConfigKey::from("slot")]);
    assert!(manager.get_config::<Config1, _>("slot").is_none());
    assert_eq!(manager.get_config::<Config2, _>("slot").unwrap().test, "def");
    assert_eq!(first.get().test, "abc");
}

#[tokio::test]
async fn test_replaced_type_is_the_one_refreshed() {
    let provider = ScriptedProvider::new(snapshot_fixtures::initial_pair());
    let (manager, mut errors) = manager_for(&provider);
    let old = manager.register_default::<Config1>("slot").unwrap();
    let new = manager.register_default::<Config2>("slot").unwrap();

    provider.set_next(snapshot_fixtures::updated_pair());
    assert_eq!(
        manager.refresh_now().await.unwrap(),
        TickOutcome::Refreshed(RefreshSummary { updated: 1, failed: 0 })
    );
    assert_eq!(new.get().test, "def1");
    assert_eq!(old.get().test, "abc");
    assert!(drain(&mut errors).is_empty());
}

#[test]
fn test_binder_may_read_the_manager() {
    use dynconf_config::{FnBinder, Snapshot};

    let provider = ScriptedProvider::new(snapshot_fixtures::initial_pair());
    let (manager, _errors) = manager_for(&provider);
    let manager = Arc::new(manager);
    manager.register_default::<Config1>("config1").unwrap();

    let lookup = Arc::downgrade(&manager);
    let binder = FnBinder::new(move |target: &mut Config2, _: &Snapshot| {
        let missing = || BindError::Missing { key: "config1".into() };
        let manager = lookup.upgrade().ok_or_else(missing)?;
        let one = manager.get_config::<Config1, _>("config1").ok_or_else(missing)?;
        target.test = format!("{}/{:?}", one.test, manager.state());
        Ok(())
    });
    let derived = manager
        .register_with_binder("derived", Config2::default, binder)
        .unwrap();

    assert_eq!(derived.get().test, "abc/Created");
}

#[test]
fn test_close_waits_for_registration_in_progress() {
    use dynconf_config::{FnBinder, Snapshot};
    use std::sync::mpsc;

    let provider = ScriptedProvider::new(snapshot_fixtures::initial_pair());
    let (manager, _errors) = manager_for(&provider);
    let manager = Arc::new(manager);

    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let release_rx = parking_lot::Mutex::new(release_rx);
    let binder = FnBinder::new(move |target: &mut Config1, snapshot: &Snapshot| {
        let _ = entered_tx.send(());
        let _ = release_rx.lock().recv();
        target.test = snapshot.get("TEST1").unwrap_or_default().to_string();
        Ok(())
    });

    let registering = {
        let manager = Arc::clone(&manager);
        std::thread::spawn(move || {
            manager
                .register_with_binder("slow", Config1::default, binder)
                .map(|handle| handle.get().test.clone())
        })
    };
    entered_rx.recv().unwrap();

    let closing = {
        let manager = Arc::clone(&manager);
        std::thread::spawn(move || manager.close())
    };
    std::thread::sleep(Duration::from_millis(100));
    assert!(!closing.is_finished());

    release_tx.send(()).unwrap();
    assert_eq!(registering.join().unwrap().unwrap(), "abc");
    closing.join().unwrap().unwrap();

    assert_eq!(manager.state(), ManagerState::Closed);
    assert!(matches!(
        manager.register_default::<Config1>("late"),
        Err(ManagerError::Closed)
    ));
}

#[test]
fn test_start_outside_runtime_is_an_error() {
    let provider = ScriptedProvider::new(snapshot_fixtures::initial_pair());
    let (manager, _errors) = manager_for(&provider);

    assert!(matches!(manager.start(), Err(ManagerError::NoRuntime)));
    assert_eq!(manager.state(), ManagerState::Created);

    // the manager can still be started once a runtime is available
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    runtime.block_on(async {
        assert_ok!(manager.start());
        assert_eq!(manager.state(), ManagerState::Started);
        assert_ok!(manager.shutdown().await);
    });
}

#[test]
fn test_readers_never_see_torn_values() {
    use dynconf_config::{BindConfig, SnapshotReader, Validate};

    #[derive(Debug, Default, Validate)]
    struct Pair {
        left: String,
        right: String,
    }

    impl BindConfig for Pair {
        fn bind(&mut self, reader: &SnapshotReader<'_>) -> Result<(), BindError> {
            self.left = reader.required("TEST1")?;
            self.right = reader.required("TEST2")?;
            Ok(())
        }
    }

    let provider = ScriptedProvider::new(snapshot_fixtures::initial_pair());
    let (manager, _errors) = manager_for(&provider);
    let handle = manager.register_default::<Pair>("pair").unwrap();
    let manager = Arc::new(manager);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let handle = handle.clone();
            std::thread::spawn(move || {
                for _ in 0..2_000 {
                    let pair = handle.get();
                    assert_eq!(pair.left.ends_with('1'), pair.right.ends_with('1'));
                }
            })
        })
        .collect();

    for i in 0..100 {
        if i % 2 == 0 {
            provider.set_next(snapshot_fixtures::updated_pair());
        } else {
            provider.set_next(snapshot_fixtures::initial_pair());
        }
        runtime.block_on(manager.refresh_now()).unwrap();
    }

    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(manager.generation(), 100);
}
