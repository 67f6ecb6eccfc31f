mod common;

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

use common::{engine, failure, ps_line, ScriptedRunner};
use dockdeck_core::{docker::COMPOSE_PROJECT_LABEL, ContextKey, Error, ToggleOutcome};

#[derive(Clone)]
struct Service {
    mode: &'static str,
    running: u64,
    desired: u64,
}

/// A tiny swarm: `service ls` reports the table, `service scale` updates it
/// and refuses global services the way docker does.
fn swarm(services: BTreeMap<&'static str, Service>) -> Arc<ScriptedRunner> {
    shared_swarm(Arc::new(Mutex::new(services)))
}

fn shared_swarm(services: Arc<Mutex<BTreeMap<&'static str, Service>>>) -> Arc<ScriptedRunner> {
    ScriptedRunner::new(move |args, _| {
        let mut services = services.lock().unwrap();
        match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
            ["service", "ls", ..] => Ok(services
                .iter()
                .map(|(name, s)| format!("{name}\t{}\t{}/{}", s.mode, s.running, s.desired))
                .collect::<Vec<_>>()
                .join("\n")),
            ["service", "scale", target] => {
                let (name, replicas) = target.split_once('=').unwrap();
                let replicas: u64 = replicas.parse().unwrap();
                match services.get_mut(name) {
                    Some(s) if s.mode == "replicated" => {
                        s.running = replicas;
                        s.desired = replicas;
                        Ok(format!("{name} scaled to {replicas}"))
                    }
                    _ => Err(failure(args)),
                }
            }
            _ => Ok(String::new()),
        }
    })
}

#[tokio::test]
#[tracing_test::traced_test]
async fn swarm_toggle_scales_replicated_services_and_restores_them() {
    let runner = swarm(BTreeMap::from([
        ("svc1", Service { mode: "replicated", running: 3, desired: 3 }),
        ("svc2", Service { mode: "global", running: 2, desired: 2 }),
    ]));
    let engine = engine(runner.clone());
    let ctx = ContextKey::Default;

    let outcome = engine.toggler().toggle(&ctx, "shop").await.unwrap();
    assert_eq!(outcome, ToggleOutcome::ScaledDown { services: 1 });
    assert_eq!(runner.count("service scale svc1=0"), 1);
    assert_eq!(runner.count("service scale svc2"), 0);
    assert_eq!(engine.toggler().remembered_replicas(&ctx, "svc1"), Some(3));
    assert!(logs_contain("Skipping service that cannot be scaled"));

    let outcome = engine.toggler().toggle(&ctx, "shop").await.unwrap();
    assert_eq!(outcome, ToggleOutcome::ScaledUp { services: 1 });
    assert_eq!(runner.count("service scale svc1=3"), 1);
    assert_eq!(runner.count("service scale svc2"), 0);
}

#[tokio::test]
async fn idle_service_keeps_its_remembered_replicas_across_scale_downs() {
    let services = Arc::new(Mutex::new(BTreeMap::from([
        ("svc1", Service { mode: "replicated", running: 3, desired: 3 }),
        ("svc2", Service { mode: "replicated", running: 2, desired: 2 }),
    ])));
    let runner = shared_swarm(services.clone());
    let engine = engine(runner.clone());
    let ctx = ContextKey::Default;

    engine.toggler().toggle(&ctx, "shop").await.unwrap();
    assert_eq!(engine.toggler().remembered_replicas(&ctx, "svc1"), Some(3));
    assert_eq!(engine.toggler().remembered_replicas(&ctx, "svc2"), Some(2));

    // Someone brings svc1 back by hand while svc2 stays at 0/0.
    services.lock().unwrap().insert(
        "svc1",
        Service { mode: "replicated", running: 3, desired: 3 },
    );

    let outcome = engine.toggler().toggle(&ctx, "shop").await.unwrap();
    assert_eq!(outcome, ToggleOutcome::ScaledDown { services: 2 });
    assert_eq!(engine.toggler().remembered_replicas(&ctx, "svc2"), Some(2));

    let outcome = engine.toggler().toggle(&ctx, "shop").await.unwrap();
    assert_eq!(outcome, ToggleOutcome::ScaledUp { services: 2 });
    assert_eq!(runner.count("service scale svc1=3"), 1);
    assert_eq!(runner.count("service scale svc2=2"), 1);
    assert_eq!(runner.count("service scale svc2=1"), 0);
}

#[tokio::test]
async fn swarm_scale_up_defaults_to_one_replica() {
    let runner = swarm(BTreeMap::from([(
        "worker",
        Service { mode: "replicated", running: 0, desired: 0 },
    )]));
    let engine = engine(runner.clone());

    let outcome = engine
        .toggler()
        .toggle(&ContextKey::named("prod"), "jobs")
        .await
        .unwrap();
    assert_eq!(outcome, ToggleOutcome::ScaledUp { services: 1 });
    assert_eq!(runner.count("service scale worker=1"), 1);
}

#[tokio::test]
async fn replica_memory_is_per_context() {
    let runner = swarm(BTreeMap::from([(
        "svc1",
        Service { mode: "replicated", running: 4, desired: 4 },
    )]));
    let engine = engine(runner);
    let a = ContextKey::named("a");

    engine.toggler().toggle(&a, "shop").await.unwrap();
    assert_eq!(engine.toggler().remembered_replicas(&a, "svc1"), Some(4));
    assert_eq!(
        engine
            .toggler()
            .remembered_replicas(&ContextKey::named("b"), "svc1"),
        None
    );
}

fn compose(states: Arc<Mutex<BTreeMap<&'static str, &'static str>>>) -> Arc<ScriptedRunner> {
    ScriptedRunner::new(move |args, _| {
        let mut states = states.lock().unwrap();
        match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
            ["ps", "-a", "--filter", filter, ..] if filter.starts_with(&format!("label={COMPOSE_PROJECT_LABEL}=web")) => {
                Ok(states
                    .iter()
                    .map(|(name, state)| ps_line(name, state, &[(COMPOSE_PROJECT_LABEL, "web")]))
                    .collect::<Vec<_>>()
                    .join("\n"))
            }
            ["start", name] if *name == "web-db" => Err(failure(args)),
            ["start", name] => {
                if let Some(state) = states.get_mut(*name) {
                    *state = "running";
                }
                Ok(name.to_string())
            }
            ["stop", name] => {
                if let Some(state) = states.get_mut(*name) {
                    *state = "exited";
                }
                Ok(name.to_string())
            }
            _ => Ok(String::new()),
        }
    })
}

#[tokio::test]
#[tracing_test::traced_test]
async fn compose_toggle_starts_stopped_members_best_effort() {
    let states = Arc::new(Mutex::new(BTreeMap::from([
        ("web-app", "exited"),
        ("web-db", "exited"),
        ("web-proxy", "running"),
    ])));
    let runner = compose(states.clone());
    let engine = engine(runner.clone());

    let outcome = engine
        .toggler()
        .toggle(&ContextKey::Default, "web")
        .await
        .unwrap();

    assert_eq!(outcome, ToggleOutcome::Started { containers: 1 });
    assert_eq!(runner.count("start web-app"), 1);
    assert_eq!(runner.count("start web-db"), 1);
    assert_eq!(runner.count("start web-proxy"), 0);
    assert_eq!(states.lock().unwrap()["web-app"], "running");
    assert!(logs_contain("Failed starting container"));
}

#[tokio::test]
async fn compose_toggle_stops_and_waits_when_all_run() {
    let states = Arc::new(Mutex::new(BTreeMap::from([
        ("web-app", "running"),
        ("web-proxy", "running"),
    ])));
    let runner = compose(states.clone());
    let engine = engine(runner.clone());

    let outcome = engine
        .toggler()
        .toggle(&ContextKey::Default, "web")
        .await
        .unwrap();

    assert_eq!(outcome, ToggleOutcome::Stopped { containers: 2 });
    let calls = runner.calls();
    let stop = calls.iter().position(|c| c == "stop web-app").unwrap();
    let wait = calls.iter().position(|c| c == "wait web-app").unwrap();
    assert!(stop < wait);
    assert_eq!(runner.count("wait "), 2);
}

#[tokio::test]
async fn unknown_stack_is_not_found() {
    let runner = compose(Arc::new(Mutex::new(BTreeMap::new())));
    let engine = engine(runner);

    let outcome = engine
        .toggler()
        .toggle(&ContextKey::Default, "ghost")
        .await
        .unwrap();
    assert_eq!(outcome, ToggleOutcome::NotFound);
}

#[tokio::test]
async fn empty_stack_name_spawns_nothing() {
    let runner = ScriptedRunner::new(|_, _| Ok(String::new()));
    let engine = engine(runner.clone());

    let result = engine.toggler().toggle(&ContextKey::Default, "  ").await;
    assert!(matches!(result, Err(Error::MissingInput("stack"))));
    assert!(runner.calls().is_empty());
}
