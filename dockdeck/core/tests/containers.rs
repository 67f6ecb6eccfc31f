mod common;

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use common::{engine, failure, ps_line, Recorder, ScriptedRunner};
use dockdeck_core::{
    docker::{ContainerSnapshot, ContainerState},
    ContextKey, PollOutcome,
};

/// Runner whose `docker ps` output can be swapped while the store polls.
fn ps_runner(output: Arc<Mutex<Option<String>>>) -> Arc<ScriptedRunner> {
    ScriptedRunner::new(move |args, _| match args.first().map(String::as_str) {
        Some("ps") => output.lock().unwrap().clone().ok_or_else(|| failure(args)),
        _ => Ok(String::new()),
    })
}

fn output(lines: &[String]) -> Arc<Mutex<Option<String>>> {
    Arc::new(Mutex::new(Some(lines.join("\n"))))
}

#[tokio::test(start_paused = true)]
async fn identical_polls_notify_once() {
    let out = output(&[ps_line("web", "running", &[]), ps_line("db", "exited", &[])]);
    let runner = ps_runner(out);
    let engine = engine(runner.clone());
    let ctx = ContextKey::Default;
    let seen: Recorder<Arc<ContainerSnapshot>> = Recorder::default();

    engine.containers().subscribe(&ctx, "key-1", seen.callback());
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert!(runner.count("ps -a") >= 6);
    assert_eq!(seen.len(), 1);
    let snapshot = engine.containers().snapshot(&ctx).unwrap();
    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot["db"].state, ContainerState::Exited);
}

#[tokio::test(start_paused = true)]
async fn state_change_is_published() {
    let out = output(&[ps_line("web", "running", &[])]);
    let runner = ps_runner(out.clone());
    let engine = engine(runner);
    let ctx = ContextKey::Default;
    let seen: Recorder<Arc<ContainerSnapshot>> = Recorder::default();

    engine.containers().subscribe(&ctx, "key-1", seen.callback());
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(seen.len(), 1);

    *out.lock().unwrap() = Some(ps_line("web", "exited", &[]));
    assert_eq!(engine.containers().poll_now(&ctx).await, PollOutcome::Changed);
    assert_eq!(engine.containers().poll_now(&ctx).await, PollOutcome::Unchanged);

    let values = seen.values();
    assert_eq!(values.len(), 2);
    assert!(values[0]["web"].state.is_running());
    assert_eq!(values[1]["web"].state, ContainerState::Exited);
}

#[tokio::test(start_paused = true)]
async fn first_fetch_notifies_even_when_empty() {
    let runner = ps_runner(output(&[]));
    let engine = engine(runner);
    let ctx = ContextKey::named("empty");
    let seen: Recorder<Arc<ContainerSnapshot>> = Recorder::default();

    engine.containers().subscribe(&ctx, "key-1", seen.callback());
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(seen.len(), 1);
    assert!(seen.values()[0].is_empty());
}

#[tokio::test(start_paused = true)]
async fn failed_poll_keeps_previous_snapshot() {
    let out = output(&[ps_line("web", "running", &[])]);
    let runner = ps_runner(out.clone());
    let engine = engine(runner);
    let ctx = ContextKey::Default;
    let seen: Recorder<Arc<ContainerSnapshot>> = Recorder::default();

    engine.containers().subscribe(&ctx, "key-1", seen.callback());
    tokio::time::sleep(Duration::from_millis(20)).await;

    *out.lock().unwrap() = None;
    assert_eq!(engine.containers().poll_now(&ctx).await, PollOutcome::Failed);
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(seen.len(), 1);
    assert_eq!(engine.containers().snapshot(&ctx).unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn slow_fetch_is_never_overlapped() {
    let runner = ScriptedRunner::slow(Duration::from_secs(5), |_, _| {
        Ok(ps_line("web", "running", &[]))
    });
    let engine = engine(runner.clone());
    let ctx = ContextKey::Default;

    engine
        .containers()
        .subscribe(&ctx, "key-1", Arc::new(|_: &Arc<ContainerSnapshot>| {}));
    // First fetch starts at 10ms and is still running well past the
    // regular 1500ms tick.
    tokio::time::sleep(Duration::from_millis(2000)).await;

    assert_eq!(engine.containers().poll_now(&ctx).await, PollOutcome::Skipped);
    assert_eq!(engine.scheduler().queued(&ctx), 0);
    assert_eq!(runner.count("ps"), 1);

    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(runner.peak(), 1);
}

#[tokio::test(start_paused = true)]
async fn late_subscriber_receives_current_snapshot() {
    let runner = ps_runner(output(&[ps_line("web", "running", &[])]));
    let engine = engine(runner);
    let ctx = ContextKey::Default;
    let late: Recorder<Arc<ContainerSnapshot>> = Recorder::default();

    engine
        .containers()
        .subscribe(&ctx, "key-1", Arc::new(|_: &Arc<ContainerSnapshot>| {}));
    tokio::time::sleep(Duration::from_millis(20)).await;

    engine.containers().subscribe(&ctx, "key-2", late.callback());
    assert_eq!(late.len(), 1);
    assert!(late.values()[0].contains_key("web"));
}

#[tokio::test(start_paused = true)]
async fn last_unsubscribe_frees_state() {
    let runner = ps_runner(output(&[ps_line("web", "running", &[])]));
    let engine = engine(runner.clone());
    let ctx = ContextKey::Default;

    engine
        .containers()
        .subscribe(&ctx, "key-1", Arc::new(|_: &Arc<ContainerSnapshot>| {}));
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(engine.containers().snapshot(&ctx).is_some());

    assert!(engine.containers().unsubscribe(&ctx, "key-1"));
    assert!(!engine.containers().is_polling(&ctx));
    assert!(engine.containers().snapshot(&ctx).is_none());
    assert_eq!(engine.containers().poll_now(&ctx).await, PollOutcome::Inactive);

    let polls = runner.count("ps");
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(runner.count("ps"), polls);
}

#[tokio::test(start_paused = true)]
async fn contexts_are_polled_independently() {
    let runner = ScriptedRunner::new(|_, context| {
        Ok(match context.name() {
            Some("remote") => ps_line("far", "running", &[]),
            _ => ps_line("near", "running", &[]),
        })
    });
    let engine = engine(runner);
    let local = ContextKey::Default;
    let remote = ContextKey::named("remote");

    for ctx in [&local, &remote] {
        engine
            .containers()
            .subscribe(ctx, "key-1", Arc::new(|_: &Arc<ContainerSnapshot>| {}));
    }
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(engine.containers().snapshot(&local).unwrap().contains_key("near"));
    assert!(engine.containers().snapshot(&remote).unwrap().contains_key("far"));
}
