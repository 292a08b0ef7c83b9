//! Lifecycle tests against the lab hub
//!
//! These play the part of the runtime's own test suite: logical threads register listeners and timers on the
//! hub, and the harness must catch whatever they leave behind.

use std::time::Duration;

use hubcheck::harness::{
    HarnessError, HarnessResult, LimitedTestCase, SchedulerSnapshot, TestSettings, assert_less_than, using_hub,
};
use hubcheck::{Hub, LabHub};
use hubcheck_core::{PatchRegistry, PatchRequest, Patcher, ThreadPool};

#[test]
fn test_well_behaved_server_leaves_hub_empty() {
    let hub = LabHub::with_virtual_clock();
    let case = LimitedTestCase::set_up("test_echo_server", &hub, TestSettings::new()).unwrap();

    case.run(|case| {
        let hub = case.hub();
        hub.set_current_thread("server");
        let listener = hub.add_reader(7, Some("accept"));
        hub.set_current_thread("main");

        hub.sleep(Duration::from_millis(50))?;
        hub.remove_listener(listener);
        Ok(())
    })
    .unwrap();

    assert!(SchedulerSnapshot::capture(&hub).is_empty());
}

#[test]
fn test_leak_message_names_the_owner() {
    let hub = LabHub::with_virtual_clock();
    let case = LimitedTestCase::set_up("test_forgets_writer", &hub, TestSettings::new()).unwrap();

    let err = case
        .run(|case| {
            case.hub().set_current_thread("green-3");
            case.hub().add_writer(11, None);
            Ok(())
        })
        .unwrap_err();

    insta::assert_snapshot!(
        err.to_string(),
        @r#"scheduler leak detected: Readers:  (0) Writers: Listener listener#2 (fd 11, write) for green thread "green-3" with run callback None (1) Timers: 0"#
    );
}

#[test]
fn test_timeout_then_leak_are_both_reported() {
    let hub = LabHub::with_virtual_clock();
    let settings = TestSettings::new().with_timeout(Duration::from_millis(20));
    let case = LimitedTestCase::set_up("test_hangs_with_reader", &hub, settings).unwrap();

    let err = case
        .run(|case| {
            case.hub().add_reader(3, Some("recv"));
            case.hub().sleep(Duration::from_secs(60))?;
            Ok(())
        })
        .unwrap_err();

    match err {
        HarnessError::TeardownFailed { primary, failures } => {
            assert!(matches!(
                primary.as_deref(),
                Some(HarnessError::CooperativeTimeoutExceeded { .. })
            ));
            assert!(matches!(failures.as_slice(), [HarnessError::SchedulerLeakDetected(s)] if s.readers.len() == 1));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_cooperative_timeout_can_be_caught_by_the_body() {
    let hub = LabHub::with_virtual_clock();
    let settings = TestSettings::new().with_timeout(Duration::from_millis(100));
    let case = LimitedTestCase::set_up("test_recovers", &hub, settings).unwrap();

    let caught = case
        .run(|case| -> HarnessResult<bool> {
            match case.hub().sleep(Duration::from_secs(1)) {
                Err(expired) => {
                    assert_eq!(expired.after, Duration::from_millis(100));
                    Ok(true)
                }
                Ok(()) => Ok(false),
            }
        })
        .unwrap();
    assert!(caught);
}

#[test]
fn test_pool_work_finishes_before_leak_check() {
    let hub = LabHub::new();
    let pool = ThreadPool::new();
    let case = LimitedTestCase::set_up("test_tpool", &hub, TestSettings::new())
        .unwrap()
        .with_pool(&pool);

    let sum = case
        .run(|_| {
            let sum = pool
                .execute(|| (1..=10).sum::<u32>())
                .map_err(|e| HarnessError::Assertion(e.to_string()))?;
            pool.submit(|| std::thread::sleep(Duration::from_millis(20)))
                .map_err(|e| HarnessError::Assertion(e.to_string()))?;
            Ok(sum)
        })
        .unwrap();
    assert_eq!(sum, 55);
    assert_eq!(hubcheck_core::WorkerPool::outstanding(&pool), 0);
}

#[test]
fn test_skip_on_this_hub() {
    let hub = LabHub::with_virtual_clock();
    let settings = TestSettings::new().skip_if(using_hub(hub_name()));
    let case = LimitedTestCase::set_up("test_epoll_only", &hub, settings).unwrap();
    assert!(case.run(|_| Ok(())).unwrap_err().is_skip());
}

fn hub_name() -> &'static str {
    "lab"
}

#[test]
fn test_patching_inside_a_test() {
    let hub = LabHub::with_virtual_clock();
    let case = LimitedTestCase::set_up("test_patch_socket_only", &hub, TestSettings::new()).unwrap();

    case.run(|_| {
        let mut registry = PatchRegistry::default();
        let patched = registry
            .apply(&PatchRequest::new().module("socket", true))
            .map_err(|e| HarnessError::Assertion(e.to_string()))?;
        assert_eq!(patched, vec!["socket".to_string()]);
        assert!(!registry.is_patched("thread"));
        assert_less_than(registry.patched_modules().len(), 2, None)
    })
    .unwrap();
}
