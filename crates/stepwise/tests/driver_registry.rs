//! Behavioural tests for per-context driver sessions.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{FakeFactory, FakeProbe, capture_warnings, captured_warnings, url};
use rstest::{fixture, rstest};
use serial_test::serial;
use stepwise::driver::{DriverErrorKind, TcpProbe, normalize_error};
use stepwise::{DriverError, DriverRegistry, RuntimeConfig, StepEventBus};

struct Harness {
    bus: StepEventBus,
    factory: Arc<FakeFactory>,
    probe: Arc<FakeProbe>,
    registry: DriverRegistry,
}

fn harness_with(config: RuntimeConfig, factory: FakeFactory, probe: FakeProbe) -> Harness {
    let config = Arc::new(config);
    let factory = Arc::new(factory);
    let probe = Arc::new(probe);
    let registry = DriverRegistry::new(Arc::clone(&config), factory.clone())
        .with_probe(probe.clone());
    Harness {
        bus: StepEventBus::with_config(config),
        factory,
        probe,
        registry,
    }
}

#[fixture]
fn local() -> Harness {
    harness_with(
        RuntimeConfig::default().with_driver("firefox"),
        FakeFactory::default(),
        FakeProbe::reachable(),
    )
}

#[rstest]
fn session_is_created_once_per_context(local: Harness) {
    let ctx = local.bus.new_context();
    assert_eq!(local.registry.current_session_id(&ctx), None);

    let Ok(first) = local.registry.current_session(&ctx) else {
        panic!("session should be created");
    };
    let Ok(again) = local.registry.current_session(&ctx) else {
        panic!("session should be reused");
    };
    assert!(first.same_session(&again));
    assert!(!first.is_disabled());
    assert_eq!(local.factory.created(), 1);
    assert_eq!(local.probe.calls(), 0, "local targets are never probed");
    assert_eq!(local.registry.current_session_id(&ctx).as_deref(), Some("session-1"));

    let capabilities = local.registry.capabilities();
    assert_eq!(
        capabilities.get("firefox").and_then(|caps| caps.get("platformName")),
        Some("linux")
    );
}

#[rstest]
fn contexts_get_distinct_sessions(local: Harness) {
    let first = local.bus.new_context();
    let second = local.bus.new_context();
    let (Ok(a), Ok(b)) = (
        local.registry.current_session(&first),
        local.registry.current_session(&second),
    ) else {
        panic!("both sessions should be created");
    };
    assert!(!a.same_session(&b));
    assert_ne!(a.id(), b.id());
    assert_eq!(local.registry.active_sessions(), 2);
}

#[rstest]
fn suspended_contexts_get_a_disabled_stand_in(local: Harness) {
    let mut ctx = local.bus.new_context();
    local.bus.suspend_driver_calls(&mut ctx);

    let Ok(session) = local.registry.current_session(&ctx) else {
        panic!("suspended contexts still get a session");
    };
    assert!(session.is_disabled());
    assert!(local.registry.current_driver_is_disabled(&ctx));
    assert_eq!(local.factory.created(), 0);
    assert!(!local.registry.has_session(&ctx));

    local.bus.resume_driver_calls(&mut ctx);
    assert!(!local.registry.current_driver_is_disabled(&ctx));
    assert!(local.registry.current_session(&ctx).is_ok_and(|session| !session.is_disabled()));
    assert_eq!(local.factory.created(), 1);
}

#[test]
fn suspended_remote_contexts_skip_reachability_and_creation() {
    let h = harness_with(
        RuntimeConfig::default().with_remote_url(url("http://grid.local:4444/wd/hub")),
        FakeFactory::default(),
        FakeProbe::unreachable(),
    );
    let mut ctx = h.bus.new_context();
    h.bus.suspend_driver_calls(&mut ctx);

    let Ok(session) = h.registry.current_session(&ctx) else {
        panic!("suspended contexts never reach the unreachable grid");
    };
    assert!(session.is_disabled());
    assert_eq!(h.probe.calls(), 0);
    assert_eq!(h.factory.created(), 0);
    assert!(!h.registry.has_session(&ctx));
}

#[test]
fn unreachable_remote_host_fails_with_a_one_line_message() {
    let config = RuntimeConfig::default()
        .with_remote_url(url("http://invalid.test:9999"))
        .with_probe_timeout(Duration::from_millis(500));
    let factory = Arc::new(FakeFactory::default());
    let registry = DriverRegistry::new(Arc::new(config), factory.clone()).with_probe(Arc::new(TcpProbe));
    let ctx = StepEventBus::new().new_context();

    let Err(err) = registry.current_session(&ctx) else {
        panic!("invalid.test must not be reachable");
    };
    assert_eq!(err.kind(), DriverErrorKind::UnreachableHost);
    let display = err.to_string();
    assert!(display.starts_with("invalid.test:9999 could not be reached: "), "{display}");
    assert!(display.len() > "invalid.test:9999 could not be reached: ".len());
    let message = normalize_error(&err);
    assert!(message.starts_with(&display), "{message}");
    assert!(!message.contains('\n'));
    assert_eq!(factory.created(), 0);
    assert!(!registry.has_session(&ctx));
}

#[test]
fn refused_probe_reports_the_io_kind() {
    let h = harness_with(
        RuntimeConfig::default().with_remote_url(url("http://grid.local:4444/wd/hub")),
        FakeFactory::default(),
        FakeProbe::unreachable(),
    );
    let ctx = h.bus.new_context();
    let Err(err) = h.registry.current_session(&ctx) else {
        panic!("probe refuses every host");
    };
    assert_eq!(
        err.to_string(),
        "grid.local:4444 could not be reached: connection refused by http://grid.local:4444/wd/hub"
    );
    assert_eq!(
        normalize_error(&err),
        "grid.local:4444 could not be reached: connection refused by http://grid.local:4444/wd/hub (ConnectionRefused)"
    );
    assert_eq!(h.probe.calls(), 1);
    assert_eq!(h.factory.created(), 0);
}

#[test]
fn reachable_remote_host_creates_a_session() {
    let h = harness_with(
        RuntimeConfig::default().with_remote_url(url("http://grid.local:4444/wd/hub")),
        FakeFactory::default(),
        FakeProbe::reachable(),
    );
    let ctx = h.bus.new_context();
    assert!(h.registry.current_session(&ctx).is_ok());
    assert_eq!(h.probe.calls(), 1);
    assert_eq!(h.registry.capabilities().browsers().collect::<Vec<_>>(), ["chrome"]);
}

#[test]
fn factory_errors_are_normalised() {
    let h = harness_with(
        RuntimeConfig::default(),
        FakeFactory::failing("session not created\nfull backend trace"),
        FakeProbe::reachable(),
    );
    let ctx = h.bus.new_context();
    let Err(err) = h.registry.current_session(&ctx) else {
        panic!("factory always fails");
    };
    assert!(matches!(err, DriverError::SessionCreation { .. }));
    assert_eq!(
        err.to_string(),
        "session not created (NotFound - chromedriver not on PATH)"
    );
    assert!(h.registry.capabilities().is_empty());
}

#[rstest]
#[serial]
fn close_all_empties_the_registry_despite_failures() {
    capture_warnings();
    let h = harness_with(
        RuntimeConfig::default(),
        FakeFactory::default().fail_close_of(2),
        FakeProbe::reachable(),
    );
    let contexts: Vec<_> = (0..3).map(|_| h.bus.new_context()).collect();
    for ctx in &contexts {
        assert!(h.registry.current_session(ctx).is_ok());
    }

    let summary = h.registry.close_all();
    assert_eq!(summary.closed, 2);
    assert_eq!(summary.failures.len(), 1);
    assert!(!summary.is_clean());
    assert_eq!(h.factory.closes(), 3);
    assert_eq!(h.registry.active_sessions(), 0);
    assert!(
        captured_warnings()
            .iter()
            .any(|line| line.contains("session-2") && line.contains("browser already gone"))
    );
}

#[rstest]
fn close_session_forgets_only_that_context(local: Harness) {
    let first = local.bus.new_context();
    let second = local.bus.new_context();
    assert!(local.registry.current_session(&first).is_ok());
    assert!(local.registry.current_session(&second).is_ok());

    assert!(matches!(local.registry.close_session(&first), Ok(true)));
    assert!(matches!(local.registry.close_session(&first), Ok(false)));
    assert!(!local.registry.has_session(&first));
    assert!(local.registry.has_session(&second));
    assert_eq!(local.factory.closes(), 1);
}
