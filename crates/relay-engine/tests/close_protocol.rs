//! Scenario tests for the close protocol (§8: P1-P6, scenarios 1-7).
//!
//! Every test uses `InlineRunloop` so the whole sequence — insertion,
//! `close_async`, child notifications — runs synchronously on the test
//! thread, making assertions about ordering and idempotence
//! straightforward.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use relay_engine::testkit::{FakeExtensionContext, FakeRemote, FakeTimer, InlineRunloop};
use relay_engine::{EngineConfig, EngineHandle, EngineId, RemoteKey, RemoteLocator, Runloop};

fn new_engine(name: &'static str) -> EngineHandle {
    let config = EngineConfig::builder(EngineId::new(name)).build();
    EngineHandle::with_borrowed_runloop(config, InlineRunloop::new())
}

/// Scenario 1: an empty engine with no children closes immediately.
#[test]
fn scenario_empty_engine_closes_immediately() {
    let engine = new_engine("empty");
    let closed = Arc::new(AtomicUsize::new(0));
    let closed_cb = closed.clone();
    engine.set_on_closed(move || {
        closed_cb.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();

    engine.close_async();

    assert_eq!(closed.load(Ordering::SeqCst), 1);
    assert!(engine.is_closing());
}

/// Scenario 2: one timer must be stopped then closed before quiescence.
#[test]
fn scenario_single_timer_blocks_then_releases_close() {
    let engine = new_engine("one-timer");
    let timer = FakeTimer::new(false);
    let id = engine.insert_timer(timer.clone());
    timer.set_id(id);

    let closed = Arc::new(AtomicUsize::new(0));
    let closed_cb = closed.clone();
    engine.set_on_closed(move || {
        closed_cb.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();

    engine.close_async();
    assert!(timer.stop_called());
    assert!(timer.close_called());
    assert_eq!(closed.load(Ordering::SeqCst), 0, "timer hasn't reported closed yet");

    timer.finish_close();
    assert_eq!(closed.load(Ordering::SeqCst), 1);
}

/// Scenario 3: two promoted remotes and one weak remote must all report
/// closed before quiescence; order of completion doesn't matter.
#[test]
fn scenario_two_remotes_and_one_weak_remote() {
    let engine = new_engine("remotes");
    let r1 = FakeRemote::new(false);
    let r2 = FakeRemote::new(false);
    let weak = FakeRemote::new(false);

    engine.insert_remote(RemoteKey::new("peer-a"), r1.clone());
    r1.set_locator(RemoteLocator::Promoted(RemoteKey::new("peer-a")));
    engine.insert_remote(RemoteKey::new("peer-b"), r2.clone());
    r2.set_locator(RemoteLocator::Promoted(RemoteKey::new("peer-b")));
    let weak_id = engine.insert_weak_remote(weak.clone());
    weak.set_locator(RemoteLocator::Weak(weak_id));

    let closed = Arc::new(AtomicUsize::new(0));
    let closed_cb = closed.clone();
    engine.set_on_closed(move || {
        closed_cb.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();

    engine.close_async();
    assert_eq!(closed.load(Ordering::SeqCst), 0);

    // Complete out of order: weak remote first, then the two promoted ones.
    weak.finish_close();
    assert_eq!(closed.load(Ordering::SeqCst), 0);
    r2.finish_close();
    assert_eq!(closed.load(Ordering::SeqCst), 0);
    r1.finish_close();
    assert_eq!(closed.load(Ordering::SeqCst), 1);
}

/// Scenario 4: a present extension context must report closed too.
#[test]
fn scenario_extension_context_present() {
    let engine = new_engine("ext-ctx");
    let ctx = FakeExtensionContext::new(false);
    engine.set_extension_context(ctx.clone());

    let closed = Arc::new(AtomicUsize::new(0));
    let closed_cb = closed.clone();
    engine.set_on_closed(move || {
        closed_cb.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();

    engine.close_async();
    assert!(ctx.close_called());
    assert_eq!(closed.load(Ordering::SeqCst), 0);

    ctx.finish_close();
    assert_eq!(closed.load(Ordering::SeqCst), 1);
}

/// Scenario 5: an outstanding async task (no child resources at all) blocks
/// close until `end_async_task` is called.
#[test]
fn scenario_uncompleted_async_task_blocks_close() {
    let engine = new_engine("async-task");
    engine.begin_async_task();

    let closed = Arc::new(AtomicUsize::new(0));
    let closed_cb = closed.clone();
    engine.set_on_closed(move || {
        closed_cb.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();

    engine.close_async();
    assert_eq!(closed.load(Ordering::SeqCst), 0);

    engine.end_async_task();
    assert_eq!(closed.load(Ordering::SeqCst), 1);
}

/// Scenario 6 / P5: calling `close_async` multiple times produces exactly
/// one `on_closed` invocation.
#[test]
fn scenario_double_close_is_idempotent() {
    let engine = new_engine("double-close");
    let timer = FakeTimer::new(false);
    let id = engine.insert_timer(timer.clone());
    timer.set_id(id);

    let closed = Arc::new(AtomicUsize::new(0));
    let closed_cb = closed.clone();
    engine.set_on_closed(move || {
        closed_cb.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();

    engine.close_async();
    engine.close_async();
    engine.close_async();

    timer.finish_close();

    assert_eq!(closed.load(Ordering::SeqCst), 1);
}

/// Scenario 7: an engine built over a host-supplied (borrowed) runloop never
/// asks that runloop to stop; only its own completion callback fires.
#[test]
fn scenario_borrowed_runloop_is_never_stopped() {
    let runloop = InlineRunloop::new();
    let config = EngineConfig::builder(EngineId::new("borrowed")).build();
    let engine = EngineHandle::with_borrowed_runloop(config, runloop.clone());

    let closed = Arc::new(AtomicUsize::new(0));
    let closed_cb = closed.clone();
    engine.set_on_closed(move || {
        closed_cb.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();

    engine.close_async();
    assert_eq!(closed.load(Ordering::SeqCst), 1);

    // The borrowed runloop itself must still accept work after the engine
    // that borrowed it has fully closed.
    let ran = Arc::new(AtomicUsize::new(0));
    let ran_cb = ran.clone();
    runloop
        .post_tail(Box::new(move || {
            ran_cb.fetch_add(1, Ordering::SeqCst);
        }))
        .expect("borrowed runloop must still be alive");
    assert_eq!(ran.load(Ordering::SeqCst), 1);
}

/// P1: once `is_closing` is true it never flips back.
#[test]
fn p1_is_closing_is_monotonic() {
    let engine = new_engine("monotonic");
    assert!(!engine.is_closing());
    engine.close_async();
    assert!(engine.is_closing());
    engine.close_async();
    assert!(engine.is_closing());
}

/// P3: `on_closed` never fires while a child is still outstanding, and
/// fires exactly once once every child has reported closed.
#[test]
fn p3_no_premature_and_exactly_once_terminate() {
    let engine = new_engine("p3");
    let timer = FakeTimer::new(false);
    let id = engine.insert_timer(timer.clone());
    timer.set_id(id);
    let remote = FakeRemote::new(false);
    engine.insert_remote(RemoteKey::new("peer"), remote.clone());
    remote.set_locator(RemoteLocator::Promoted(RemoteKey::new("peer")));

    let closed = Arc::new(AtomicUsize::new(0));
    let closed_cb = closed.clone();
    engine.set_on_closed(move || {
        closed_cb.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();

    engine.close_async();
    assert_eq!(closed.load(Ordering::SeqCst), 0);
    timer.finish_close();
    assert_eq!(closed.load(Ordering::SeqCst), 0, "remote still outstanding");
    remote.finish_close();
    assert_eq!(closed.load(Ordering::SeqCst), 1);
}

/// P6: message-send style boundary checks reject once the engine is closing.
#[test]
fn p6_reject_if_closing_after_close_requested() {
    let engine = new_engine("p6");
    assert!(engine.reject_if_closing().is_ok());
    engine.close_async();
    assert!(engine.reject_if_closing().is_err());
}

/// §4.8 / §9: `set_on_closed` after `close_async` is rejected, not silently
/// dropped or panicking.
#[test]
fn set_on_closed_after_close_requested_is_rejected() {
    let engine = new_engine("late-register");
    engine.close_async();
    let result = engine.set_on_closed(|| {});
    assert!(result.is_err());
}
