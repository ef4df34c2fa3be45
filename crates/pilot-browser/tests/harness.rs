//! Test lifecycle: scopes, outcomes, hooks and reporting.

use std::sync::Arc;

use parking_lot::Mutex;
use pilot_browser::testing::{FakeCall, FakeFactory, RecordingSink, ReportEvent};
use pilot_browser::{
    AllureSink, BrowserError, FrameworkContext, Hooks, ScopeState, Status, StepId, TestOutcome,
    WorkerId,
};
use pilot_config::BrowserType;
use tempfile::TempDir;

mod common;

fn fakes() -> (Arc<FakeFactory>, Arc<RecordingSink>) {
    (Arc::new(FakeFactory::new()), Arc::new(RecordingSink::new()))
}

#[tokio::test]
async fn passing_test_reports_and_quits() {
    let (factory, sink) = fakes();
    let ctx = common::fake_context(factory.clone(), sink.clone());

    let outcome = ctx
        .run_test("home loads", BrowserType::Chrome, |session| async move {
            session.driver().navigate(&session.url("/")).await?;
            Ok(())
        })
        .await;

    assert_eq!(outcome, TestOutcome::Passed);
    let driver = factory.last_driver().unwrap();
    assert_eq!(driver.navigations(), vec!["http://localhost:4173/".to_string()]);
    assert!(driver.is_quit());
    assert_eq!(
        sink.report_for("home loads").unwrap().outcome(),
        Some(TestOutcome::Passed)
    );
    assert_eq!(ctx.store().active_count(), 0);
}

#[tokio::test]
async fn failing_test_attaches_evidence() {
    let (factory, sink) = fakes();
    let ctx = common::fake_context(factory.clone(), sink.clone());

    let outcome = ctx
        .run_test("checkout", BrowserType::Edge, |_session| async move {
            anyhow::bail!("total was 0.00")
        })
        .await;

    assert_eq!(
        outcome,
        TestOutcome::Failed {
            message: "total was 0.00".to_string()
        }
    );
    let report = sink.report_for("checkout").unwrap();
    assert_eq!(
        report.attachment_names(),
        vec!["failure screenshot".to_string(), "page source".to_string()]
    );
    assert!(factory.last_driver().unwrap().is_quit());
}

#[tokio::test]
async fn screenshots_can_be_disabled() {
    let (factory, sink) = fakes();
    let mut settings = common::fast_settings();
    settings.framework.screenshot_on_failure = false;
    let ctx = FrameworkContext::builder(settings)
        .registry(common::fake_registry(factory.clone()))
        .report_sink(sink.clone())
        .browser_filter(None)
        .build();

    ctx.run_test("t", BrowserType::Chrome, |_| async { anyhow::bail!("no") })
        .await;

    assert!(sink.report_for("t").unwrap().attachment_names().is_empty());
    assert_eq!(factory.last_driver().unwrap().call_count(FakeCall::Screenshot), 0);
}

fn explode() -> anyhow::Result<()> {
    panic!("unexpected modal")
}

#[tokio::test]
async fn panics_become_failures_and_still_tear_down() {
    let (factory, sink) = fakes();
    let ctx = common::fake_context(factory.clone(), sink);

    let outcome = ctx
        .run_test("explodes", BrowserType::Chrome, |_session| async move { explode() })
        .await;

    match outcome {
        TestOutcome::Failed { message } => assert!(message.contains("unexpected modal")),
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(factory.last_driver().unwrap().is_quit());
    assert_eq!(ctx.store().active_count(), 0);
}

#[tokio::test]
async fn setup_failure_is_broken_and_skips_body() {
    let factory = Arc::new(FakeFactory::new().failing_launch("no chrome"));
    let sink = Arc::new(RecordingSink::new());
    let ctx = common::fake_context(factory, sink.clone());
    let ran = Arc::new(Mutex::new(false));
    let flag = ran.clone();

    let outcome = ctx
        .run_test("never runs", BrowserType::Chrome, |_| async move {
            *flag.lock() = true;
            Ok(())
        })
        .await;

    assert!(matches!(outcome, TestOutcome::Broken { .. }));
    assert!(!*ran.lock());
    assert!(matches!(
        sink.report_for("never runs").unwrap().outcome(),
        Some(TestOutcome::Broken { .. })
    ));
}

#[tokio::test]
async fn hooks_run_in_registration_order() {
    let (factory, sink) = fakes();
    let order = Arc::new(Mutex::new(Vec::new()));

    let hooks = {
        let (a, b, c) = (order.clone(), order.clone(), order.clone());
        Hooks::new()
            .before_each("login", move |_| {
                let order = a.clone();
                async move {
                    order.lock().push("before:login");
                    Ok(())
                }
            })
            .before_each("seed", move |_| {
                let order = b.clone();
                async move {
                    order.lock().push("before:seed");
                    Ok(())
                }
            })
            .after_each("logout", move |_| {
                let order = c.clone();
                async move {
                    order.lock().push("after:logout");
                    Ok(())
                }
            })
    };

    let ctx = common::fake_context_builder(factory, sink).hooks(hooks).build();
    let body_order = order.clone();
    let outcome = ctx
        .run_test("ordered", BrowserType::Chrome, |_| async move {
            body_order.lock().push("body");
            Ok(())
        })
        .await;

    assert_eq!(outcome, TestOutcome::Passed);
    assert_eq!(
        *order.lock(),
        vec!["before:login", "before:seed", "body", "after:logout"]
    );
}

#[tokio::test]
async fn failing_before_hook_breaks_test_but_after_hooks_run() {
    let (factory, sink) = fakes();
    let cleaned = Arc::new(Mutex::new(false));
    let flag = cleaned.clone();

    let hooks = Hooks::new()
        .before_each("login", |_| async { anyhow::bail!("bad credentials") })
        .after_each("cleanup", move |_| {
            let flag = flag.clone();
            async move {
                *flag.lock() = true;
                Ok(())
            }
        });

    let ctx = common::fake_context_builder(factory.clone(), sink).hooks(hooks).build();
    let outcome = ctx
        .run_test("t", BrowserType::Chrome, |_| async { Ok(()) })
        .await;

    match outcome {
        TestOutcome::Broken { message } => {
            assert!(message.contains("before_each hook 'login' failed"));
            assert!(message.contains("bad credentials"));
        }
        other => panic!("expected broken, got {other:?}"),
    }
    assert!(*cleaned.lock());
    assert!(factory.last_driver().unwrap().is_quit());
}

#[tokio::test]
async fn panicking_before_hook_still_tears_down() {
    let (factory, sink) = fakes();
    let hooks = Hooks::new().before_each("login", |_| async { explode() });
    let ctx = common::fake_context_builder(factory.clone(), sink.clone())
        .hooks(hooks)
        .build();

    let outcome = ctx
        .run_test("guarded", BrowserType::Chrome, |_| async { Ok(()) })
        .await;

    match &outcome {
        TestOutcome::Broken { message } => {
            assert!(message.contains("before_each hook 'login' failed"));
            assert!(message.contains("unexpected modal"));
        }
        other => panic!("expected broken, got {other:?}"),
    }
    assert!(factory.last_driver().unwrap().is_quit());
    assert_eq!(ctx.store().active_count(), 0);
    assert_eq!(sink.report_for("guarded").unwrap().outcome(), Some(outcome));
}

#[tokio::test]
async fn panicking_after_hook_breaks_test_and_later_hooks_run() {
    let (factory, sink) = fakes();
    let cleaned = Arc::new(Mutex::new(false));
    let flag = cleaned.clone();
    let hooks = Hooks::new()
        .after_each("logout", |_| async { explode() })
        .after_each("cleanup", move |_| {
            let flag = flag.clone();
            async move {
                *flag.lock() = true;
                Ok(())
            }
        });
    let ctx = common::fake_context_builder(factory.clone(), sink.clone())
        .hooks(hooks)
        .build();

    let outcome = ctx
        .run_test("t", BrowserType::Chrome, |_| async { Ok(()) })
        .await;

    match &outcome {
        TestOutcome::Broken { message } => {
            assert!(message.contains("after_each hook 'logout' failed"));
            assert!(message.contains("hook panicked: unexpected modal"));
        }
        other => panic!("expected broken, got {other:?}"),
    }
    assert!(*cleaned.lock());
    assert!(factory.last_driver().unwrap().is_quit());
    assert_eq!(ctx.store().active_count(), 0);
    assert_eq!(sink.report_for("t").unwrap().outcome(), Some(outcome));
}

#[tokio::test]
async fn failing_after_hook_breaks_a_passing_test() {
    let (factory, sink) = fakes();
    let hooks = Hooks::new().after_each("logout", |_| async { anyhow::bail!("session gone") });
    let ctx = common::fake_context_builder(factory, sink).hooks(hooks).build();

    let outcome = ctx
        .run_test("t", BrowserType::Chrome, |_| async { Ok(()) })
        .await;

    assert!(matches!(outcome, TestOutcome::Broken { .. }));
}

#[tokio::test]
async fn filtered_browser_is_skipped_without_a_driver() {
    let (factory, sink) = fakes();
    let ctx = common::fake_context_builder(factory.clone(), sink.clone())
        .browser_filter(Some("edge".to_string()))
        .build();

    let outcome = ctx
        .run_test("t", BrowserType::Chrome, |_| async { Ok(()) })
        .await;

    assert!(matches!(outcome, TestOutcome::Skipped { .. }));
    assert!(factory.created().is_empty());
    assert!(matches!(
        sink.report_for("t").unwrap().outcome(),
        Some(TestOutcome::Skipped { .. })
    ));
    assert!(ctx.is_browser_enabled(BrowserType::Edge));
}

#[tokio::test]
async fn run_across_browsers_respects_filter() {
    let (factory, sink) = fakes();
    let ctx = common::fake_context_builder(factory.clone(), sink)
        .browser_filter(Some("chrome,brave".to_string()))
        .build();

    let outcomes = ctx
        .run_across_browsers("smoke", |session| async move {
            anyhow::ensure!(session.name().starts_with("smoke ["));
            Ok(())
        })
        .await;

    let browsers: Vec<BrowserType> = outcomes.iter().map(|(browser, _)| *browser).collect();
    assert_eq!(browsers, vec![BrowserType::Chrome, BrowserType::Brave]);
    assert!(outcomes.iter().all(|(_, outcome)| outcome.is_passed()));
    assert_eq!(factory.created().len(), 2);
}

#[tokio::test]
async fn steps_are_reported() {
    let (factory, sink) = fakes();
    let ctx = common::fake_context(factory, sink.clone());

    ctx.run_test("stepped", BrowserType::Chrome, |session| async move {
        session
            .step("open", session.driver().navigate("about:blank"))
            .await?;
        let missing: Result<(), BrowserError> = session
            .step("find", async { Err(BrowserError::NotInitialized) })
            .await;
        assert!(missing.is_err());
        Ok(())
    })
    .await;

    let events = sink.report_for("stepped").unwrap().events();
    assert_eq!(
        events[0],
        ReportEvent::StepStarted {
            name: "open".to_string(),
            parent: None
        }
    );
    assert_eq!(
        events[1],
        ReportEvent::StepFinished {
            step: StepId(0),
            status: Status::Passed,
            message: None
        }
    );
    assert!(matches!(
        &events[3],
        ReportEvent::StepFinished {
            status: Status::Failed,
            ..
        }
    ));
}

#[tokio::test]
async fn concurrent_steps_are_siblings_and_nested_steps_are_children() {
    let (factory, sink) = fakes();
    let ctx = common::fake_context(factory, sink.clone());

    ctx.run_test("parallel", BrowserType::Chrome, |session| async move {
        let other = session.clone();
        let (list, detail) = tokio::join!(
            session.step("load list", async {
                tokio::task::yield_now().await;
                session
                    .step("scroll", async { Ok::<_, BrowserError>(()) })
                    .await
            }),
            other.step("load detail", async {
                other.attach("detail", "text/plain", b"empty")?;
                Err::<(), _>(BrowserError::NotInitialized)
            }),
        );
        assert!(list.is_ok());
        assert!(detail.is_err());
        Ok(())
    })
    .await;

    let events = sink.report_for("parallel").unwrap().events();
    let started: Vec<(String, Option<StepId>)> = events
        .iter()
        .filter_map(|event| match event {
            ReportEvent::StepStarted { name, parent } => Some((name.clone(), *parent)),
            _ => None,
        })
        .collect();
    assert_eq!(
        started,
        vec![
            ("load list".to_string(), None),
            ("load detail".to_string(), None),
            ("scroll".to_string(), Some(StepId(0))),
        ]
    );
    assert!(events.contains(&ReportEvent::Attachment {
        step: Some(StepId(1)),
        name: "detail".to_string(),
        content_type: "text/plain".to_string(),
        size: 5,
    }));
    assert!(events.iter().any(|event| matches!(
        event,
        ReportEvent::StepFinished {
            step: StepId(1),
            status: Status::Failed,
            ..
        }
    )));
    assert!(events.iter().any(|event| matches!(
        event,
        ReportEvent::StepFinished {
            step: StepId(0),
            status: Status::Passed,
            ..
        }
    )));
}

#[tokio::test]
async fn unavailable_report_is_broken_without_starting_a_driver() {
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("results");
    std::fs::write(&blocker, b"not a directory").unwrap();
    let factory = Arc::new(FakeFactory::new());
    let ctx = FrameworkContext::builder(common::fast_settings())
        .registry(common::fake_registry(factory.clone()))
        .report_sink(Arc::new(AllureSink::new(blocker.clone())))
        .browser_filter(None)
        .build();

    let outcome = ctx
        .run_test("unreported", BrowserType::Chrome, |_| async { Ok(()) })
        .await;

    assert!(matches!(outcome, TestOutcome::Broken { .. }));
    assert!(factory.created().is_empty());
    assert_eq!(ctx.store().active_count(), 0);
}

#[tokio::test]
async fn scope_state_machine() {
    let (factory, sink) = fakes();
    let ctx = common::fake_context(factory.clone(), sink);

    WorkerId::next()
        .scope(async {
            let mut scope = ctx.scope("manual", BrowserType::Chrome);
            assert_eq!(scope.state(), ScopeState::Uninitialized);

            let session = scope.initialize().await.unwrap();
            assert_eq!(scope.state(), ScopeState::Ready);
            assert_eq!(session.correlation_id(), scope.correlation_id());
            assert!(ctx.store().is_initialized());

            assert!(matches!(
                scope.initialize().await,
                Err(BrowserError::InvalidScopeState { .. })
            ));

            scope.finalize(&TestOutcome::Passed).await.unwrap();
            assert_eq!(scope.state(), ScopeState::Finalized);
            assert!(!ctx.store().is_initialized());

            assert!(matches!(
                scope.finalize(&TestOutcome::Passed).await,
                Err(BrowserError::InvalidScopeState {
                    actual: "finalized",
                    ..
                })
            ));
        })
        .await;

    assert!(factory.last_driver().unwrap().is_quit());
}

#[tokio::test]
async fn uninitialized_scope_can_be_finalized() {
    let (factory, sink) = fakes();
    let ctx = common::fake_context(factory.clone(), sink.clone());

    let mut scope = ctx.scope("aborted", BrowserType::Chrome);
    scope
        .finalize(&TestOutcome::Broken {
            message: "fixture failed".to_string(),
        })
        .await
        .unwrap();

    assert_eq!(scope.state(), ScopeState::Finalized);
    assert!(factory.created().is_empty());
    assert!(sink.report_for("aborted").unwrap().outcome().is_some());
}

#[tokio::test]
async fn shutdown_quits_leaked_drivers() {
    let (factory, sink) = fakes();
    let ctx = common::fake_context(factory.clone(), sink);

    for name in ["a", "b"] {
        let ctx = ctx.clone();
        WorkerId::next()
            .scope(async move {
                let mut scope = ctx.scope(name, BrowserType::Chrome);
                scope.initialize().await.unwrap();
            })
            .await;
    }

    assert_eq!(ctx.store().active_count(), 2);
    assert_eq!(ctx.shutdown().await, 2);
    assert_eq!(ctx.store().active_count(), 0);
    assert!(factory.created().iter().all(|driver| driver.is_quit()));
}

#[tokio::test]
async fn allure_results_are_written() {
    let dir = TempDir::new().unwrap();
    let factory = Arc::new(FakeFactory::new());
    let ctx = FrameworkContext::builder(common::fast_settings())
        .registry(common::fake_registry(factory))
        .report_sink(Arc::new(AllureSink::new(dir.path())))
        .browser_filter(None)
        .build();

    ctx.run_test("writes report", BrowserType::Chrome, |_| async {
        anyhow::bail!("assertion failed")
    })
    .await;

    let files: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(files.iter().filter(|f| f.ends_with("-result.json")).count(), 1);
    assert_eq!(files.iter().filter(|f| f.ends_with("-attachment.png")).count(), 1);
    assert_eq!(files.iter().filter(|f| f.ends_with("-attachment.html")).count(), 1);

    let result = files.iter().find(|f| f.ends_with("-result.json")).unwrap();
    let json: serde_json::Value =
        serde_json::from_slice(&std::fs::read(dir.path().join(result)).unwrap()).unwrap();
    assert_eq!(json["status"], "failed");
    assert_eq!(json["name"], "writes report");
    assert_eq!(json["statusDetails"]["message"], "assertion failed");
}
