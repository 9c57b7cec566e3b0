//! Behavioural tests for the step event bus as a host drives it.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use common::{capture_warnings, captured_warnings};
use rstest::rstest;
use serial_test::serial;
use stepwise::{
    BusError, ContextId, ObserverError, ReportCollector, RuntimeConfig, ScreenshotPreference,
    Step, StepDescriptor, StepEventBus, StepObserver, StepOutcome, StepOwner, StepStatus,
    TestRecord,
};
use stepwise_policy::ScreenshotSettings;

#[derive(Default)]
struct Counting {
    finished: AtomicUsize,
    fail: bool,
}

impl StepObserver for Counting {
    fn name(&self) -> &str {
        if self.fail { "failing counter" } else { "counter" }
    }

    fn test_finished(&self, _record: &TestRecord) -> Result<(), ObserverError> {
        self.finished.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ObserverError::new("could not write report"));
        }
        Ok(())
    }
}

struct StatusChecker;

impl StepObserver for StatusChecker {
    fn step_finished(&self, _context: ContextId, step: &Step) {
        assert!(step.status().is_terminal(), "{} finished as {}", step.name(), step.status());
    }
}

#[test]
#[serial]
fn second_of_three_observers_failing_is_reported_once() {
    capture_warnings();
    let bus = StepEventBus::new();
    let observers = [
        Arc::new(Counting::default()),
        Arc::new(Counting {
            fail: true,
            ..Counting::default()
        }),
        Arc::new(Counting::default()),
    ];
    for observer in &observers {
        assert!(bus.register_listener(observer.clone()));
    }

    let mut ctx = bus.new_context();
    assert!(bus.test_started(&mut ctx, "reporting").is_ok());
    let Err(BusError::Notification(errors)) = bus.test_finished(&mut ctx) else {
        panic!("the failing observer should be reported");
    };

    assert!(
        observers
            .iter()
            .all(|observer| observer.finished.load(Ordering::SeqCst) == 1)
    );
    let [failure] = errors.failures() else {
        panic!("exactly one failure expected");
    };
    assert_eq!(failure.observer, "failing counter");
    assert_eq!(failure.error.to_string(), "could not write report");
    assert_eq!(errors.into_record().result(), StepStatus::Success);
    assert_eq!(
        captured_warnings()
            .iter()
            .filter(|line| line.contains("could not write report"))
            .count(),
        1
    );
}

#[test]
fn finished_step_trees_are_all_terminal() {
    let bus = StepEventBus::new();
    bus.register_listener(Arc::new(StatusChecker));
    let mut ctx = bus.new_context();
    assert!(bus.test_started(&mut ctx, "nested steps").is_ok());

    let outcome = bus.run_step(&mut ctx, "buy a ticket", |ctx| {
        let inner = [
            ("choose a seat", StepOutcome::Passed),
            ("pay by card", StepOutcome::failed("card declined")),
            ("print the ticket", StepOutcome::Passed),
        ];
        for (name, outcome) in inner {
            if let Err(err) = bus.run_step(ctx, name, move |_| outcome) {
                return StepOutcome::errored(err.to_string());
            }
        }
        StepOutcome::Passed
    });
    assert!(outcome.is_ok());
    let Ok(record) = bus.test_finished(&mut ctx) else {
        panic!("test should finish");
    };

    assert!(record.all_steps().all(|step| step.status().is_terminal()));
    let statuses: Vec<_> = record.all_steps().map(Step::status).collect();
    assert_eq!(
        statuses,
        [
            StepStatus::Failure,
            StepStatus::Success,
            StepStatus::Failure,
            StepStatus::Skipped,
        ]
    );
    assert_eq!(record.result(), StepStatus::Failure);
}

#[test]
fn variables_do_not_survive_the_test() {
    let bus = StepEventBus::new();
    let mut ctx = bus.new_context();
    assert!(bus.test_started(&mut ctx, "first").is_ok());
    ctx.variables_mut().set("basket", Some(vec!["tea"]));
    ctx.variables_mut().set("voucher", Some("SPRING"));
    ctx.variables_mut().set("voucher", None::<&str>);
    assert!(!ctx.variables().contains("voucher"));
    assert!(ctx.variables().contains("basket"));
    assert!(bus.test_finished(&mut ctx).is_ok());

    assert!(ctx.variables().is_empty());
}

#[rstest]
#[case::method_wins(Some(ScreenshotPreference::Disabled), Some(ScreenshotPreference::ForEachAction), ScreenshotPreference::Disabled)]
#[case::class_wins(None, Some(ScreenshotPreference::ForEachAction), ScreenshotPreference::ForEachAction)]
#[case::configured_class(None, None, ScreenshotPreference::ForFailures)]
fn screenshot_levels_follow_step_declarations(
    #[case] method: Option<ScreenshotPreference>,
    #[case] class: Option<ScreenshotPreference>,
    #[case] expected_threshold: ScreenshotPreference,
) {
    let mut settings = ScreenshotSettings::with_level(ScreenshotPreference::AfterEachStep);
    settings
        .class_levels
        .insert("CheckoutSteps".to_owned(), ScreenshotPreference::ForFailures);
    let bus = StepEventBus::with_config(Arc::new(RuntimeConfig::default().with_screenshots(settings)));
    let mut ctx = bus.new_context();
    assert!(bus.test_started(&mut ctx, "screenshots").is_ok());

    let mut owner = StepOwner::new("CheckoutSteps");
    if let Some(level) = class {
        owner = owner.with_screenshots(level);
    }
    let mut descriptor = StepDescriptor::new("confirm the order").owned_by(owner);
    if let Some(level) = method {
        descriptor = descriptor.with_screenshots(level);
    }
    let Ok(id) = bus.step_started(&mut ctx, descriptor) else {
        panic!("step should start");
    };

    for level in ScreenshotPreference::ALL {
        assert_eq!(
            bus.screenshots_allowed(&ctx, level),
            level >= expected_threshold,
            "level {level} against threshold {expected_threshold}"
        );
    }
    assert!(bus.step_finished(&mut ctx, id, StepOutcome::Passed).is_ok());
}

#[test]
fn report_collector_sees_every_context() {
    let bus = StepEventBus::new();
    let reports = Arc::new(ReportCollector::new());
    bus.register_listener(reports.clone());
    let mut first = bus.new_context();
    let mut second = bus.new_context();

    assert!(bus.test_started(&mut first, "one").is_ok());
    assert!(bus.test_started(&mut second, "two").is_ok());
    assert!(bus.run_step(&mut second, "wait", |_| StepOutcome::pending("not built")).is_ok());
    assert!(bus.test_finished(&mut second).is_ok());
    assert!(bus.test_finished(&mut first).is_ok());

    let summaries = reports.drain();
    let names: Vec<_> = summaries.iter().map(|summary| summary.name()).collect();
    assert_eq!(names, ["two", "one"]);
    assert_eq!(summaries.first().map(|summary| summary.result()), Some(StepStatus::Pending));
    assert_eq!(summaries.first().map(|summary| summary.context()), Some(second.id()));
}
