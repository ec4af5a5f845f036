//! Plan compilation and execution: graph building, ordering, rollback scope.

mod common;

use std::time::Duration;

use planvisor::{
    Config, Depends, DependsKind, ExecError, RegistryError, Rollback, RollbackKind, Status, Task,
    TaskKind,
};

use common::{engine_with_mocks, failing_op, op, register_component};

fn update_task(id: &str, component: &str) -> Task {
    Task::new(id, TaskKind::Update, vec![component.into()]).with_metadata(op(id))
}

fn chained(id: &str, component: &str, dep: &str) -> Task {
    update_task(id, component).with_depends(Depends::new(DependsKind::Advisory, dep))
}

#[tokio::test]
async fn chain_compiles_into_one_graph_rooted_at_the_head() {
    let (engine, _, _) = engine_with_mocks(Config::default()).await;
    register_component(&engine, "c1").await;

    let plan = engine
        .plans
        .register(vec![
            update_task("t1", "c1"),
            chained("t2", "c1", "t1"),
            chained("t3", "c1", "t2"),
        ])
        .await
        .unwrap();

    assert_eq!(plan.task_graphs.len(), 1);
    let graph = &plan.task_graphs[0];
    assert_eq!(graph.root_task_id, "t1");
    assert_eq!(graph.len(), 3);
    assert_eq!(plan.status_history.unwrap().status(), Status::Created);
}

#[tokio::test]
async fn execution_follows_topological_order() {
    let (engine, controller, _) = engine_with_mocks(Config::default()).await;
    register_component(&engine, "c1").await;

    let plan = engine
        .plans
        .register(vec![
            update_task("t1", "c1"),
            chained("t2", "c1", "t1"),
            chained("t3", "c1", "t2"),
        ])
        .await
        .unwrap();

    engine.plans.run(&plan.id, None).await.unwrap();

    assert_eq!(controller.runs(), vec!["t1", "t2", "t3"]);
    assert_eq!(engine.plans.status(&plan.id).await.unwrap(), Status::Success);
    for id in ["t1", "t2", "t3"] {
        assert_eq!(engine.tasks.status(id).await.unwrap(), Status::Success);
    }
}

#[tokio::test]
async fn independent_chains_compile_into_disjoint_graphs() {
    let (engine, _, _) = engine_with_mocks(Config::default()).await;
    register_component(&engine, "c1").await;

    let plan = engine
        .plans
        .register(vec![
            update_task("a", "c1"),
            chained("b", "c1", "a"),
            update_task("c", "c1"),
            chained("d", "c1", "c"),
        ])
        .await
        .unwrap();

    assert_eq!(plan.task_graphs.len(), 2);

    let mut roots: Vec<&str> = plan
        .task_graphs
        .iter()
        .map(|g| g.root_task_id.as_str())
        .collect();
    roots.sort_unstable();
    assert_eq!(roots, vec!["a", "c"]);

    // every task appears in exactly one graph
    assert_eq!(plan.task_count(), 4);
    for id in ["a", "b", "c", "d"] {
        let owners = plan.task_graphs.iter().filter(|g| g.contains(id)).count();
        assert_eq!(owners, 1, "task {id} must live in exactly one graph");
    }

    engine.plans.run(&plan.id, None).await.unwrap();
    assert_eq!(engine.plans.status(&plan.id).await.unwrap(), Status::Success);
}

#[tokio::test]
async fn cyclic_dependencies_are_rejected() {
    let (engine, _, _) = engine_with_mocks(Config::default()).await;
    register_component(&engine, "c1").await;

    let err = engine
        .plans
        .register(vec![
            update_task("x", "c1").with_depends(Depends::new(DependsKind::Advisory, "y")),
            update_task("y", "c1").with_depends(Depends::new(DependsKind::Advisory, "x")),
        ])
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::CycleDetected { .. }));
}

#[tokio::test]
async fn empty_plan_is_rejected() {
    let (engine, _, _) = engine_with_mocks(Config::default()).await;
    let err = engine.plans.register(Vec::new()).await.unwrap_err();
    assert!(matches!(err, RegistryError::EmptyPlan));
}

#[tokio::test]
async fn failed_task_rolls_back_completed_predecessors_in_reverse() {
    let (engine, controller, _) = engine_with_mocks(Config::default()).await;
    register_component(&engine, "c1").await;

    let with_rollback = |id: &str| {
        update_task(id, "c1").with_roll_back(Rollback {
            kind: RollbackKind::Trigger,
            components: Some(vec!["c1".into()]),
            metadata: Some(op(&format!("rb-{id}"))),
        })
    };

    let plan = engine
        .plans
        .register(vec![
            with_rollback("t1"),
            with_rollback("t2").with_depends(Depends::new(DependsKind::Advisory, "t1")),
            Task::new("t3", TaskKind::Update, vec!["c1".into()])
                .with_metadata(failing_op("t3"))
                .with_depends(Depends::new(DependsKind::Advisory, "t2")),
        ])
        .await
        .unwrap();

    let err = engine.plans.run(&plan.id, None).await.unwrap_err();
    assert!(matches!(err, ExecError::GraphFailed { .. }));

    // completed predecessors rolled back in reverse execution order
    assert_eq!(controller.runs(), vec!["t1", "t2", "t3", "rb-t2", "rb-t1"]);

    assert_eq!(engine.plans.status(&plan.id).await.unwrap(), Status::Failed);
    assert_eq!(engine.tasks.status("t3").await.unwrap(), Status::Failed);
    assert_eq!(engine.tasks.status("t2").await.unwrap(), Status::Rollback);
    assert_eq!(engine.tasks.status("t1").await.unwrap(), Status::Rollback);

    // the failure lands in the plan's event log
    let stored = engine.plans.get(&plan.id).await.unwrap();
    let messages: Vec<String> = stored
        .event_history
        .unwrap()
        .snapshot()
        .into_iter()
        .map(|e| e.message)
        .collect();
    assert!(messages.iter().any(|m| m.starts_with("Plan failed:")));

    // checkpoints were recorded for the tasks that completed
    let checkpointed: Vec<&str> = stored
        .rollback_stack
        .iter()
        .map(|cp| cp.task_id.as_str())
        .collect();
    assert_eq!(checkpointed, vec!["t1", "t2"]);
    for cp in &stored.rollback_stack {
        assert_eq!(cp.state["c1"].version, "1.0.0");
    }
}

#[tokio::test]
async fn first_task_failure_rolls_back_nothing() {
    let (engine, controller, _) = engine_with_mocks(Config::default()).await;
    register_component(&engine, "c1").await;

    let plan = engine
        .plans
        .register(vec![
            Task::new("t1", TaskKind::Update, vec!["c1".into()]).with_metadata(failing_op("t1")),
            chained("t2", "c1", "t1"),
        ])
        .await
        .unwrap();

    engine.plans.run(&plan.id, None).await.unwrap_err();
    assert_eq!(controller.runs(), vec!["t1"]);
    assert_eq!(engine.tasks.status("t2").await.unwrap(), Status::Created);
}

#[tokio::test]
async fn completed_plan_cannot_run_again() {
    let (engine, _, _) = engine_with_mocks(Config::default()).await;
    register_component(&engine, "c1").await;

    let plan = engine
        .plans
        .register(vec![update_task("t1", "c1")])
        .await
        .unwrap();

    engine.plans.run(&plan.id, None).await.unwrap();
    let err = engine.plans.run(&plan.id, None).await.unwrap_err();
    assert!(matches!(err, ExecError::AlreadyCompleted { .. }));
}

#[tokio::test]
async fn run_async_returns_immediately_and_completes() {
    let (engine, _, _) = engine_with_mocks(Config::default()).await;
    register_component(&engine, "c1").await;

    let plan = engine
        .plans
        .register(vec![update_task("t1", "c1")])
        .await
        .unwrap();

    let execution = engine
        .plans
        .clone()
        .run_async(&plan.id, Some("exec-1".into()))
        .await
        .unwrap();
    assert_eq!(execution, "exec-1");

    for _ in 0..100 {
        if engine.plans.status(&plan.id).await.unwrap() == Status::Success {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(engine.plans.status(&plan.id).await.unwrap(), Status::Success);

    let missing = engine.plans.clone().run_async("ghost", None).await;
    assert!(matches!(missing, Err(RegistryError::NotFound { .. })));
}

#[tokio::test]
async fn stop_and_pause_require_a_running_plan() {
    let (engine, _, _) = engine_with_mocks(Config::default()).await;
    register_component(&engine, "c1").await;

    let plan = engine
        .plans
        .register(vec![update_task("t1", "c1")])
        .await
        .unwrap();

    let err = engine.plans.stop(&plan.id).await.unwrap_err();
    assert!(matches!(err, ExecError::IllegalStateTransition { .. }));
    let err = engine.plans.pause(&plan.id).await.unwrap_err();
    assert!(matches!(err, ExecError::IllegalStateTransition { .. }));
}

#[tokio::test]
async fn stopping_a_running_plan_prevents_new_tasks() {
    let (engine, controller, _) = engine_with_mocks(Config::default()).await;
    register_component(&engine, "c1").await;

    // the first task holds the graph in-flight long enough to stop the plan
    let mut slow = op("gate");
    slow.insert("sleep_ms".into(), "500".into());

    let plan = engine
        .plans
        .register(vec![
            Task::new("gate", TaskKind::Update, vec!["c1".into()]).with_metadata(slow),
            chained("t2", "c1", "gate"),
        ])
        .await
        .unwrap();

    engine
        .plans
        .clone()
        .run_async(&plan.id, None)
        .await
        .unwrap();

    // wait until the plan is running, then stop it while the gate sleeps
    for _ in 0..100 {
        if engine.plans.status(&plan.id).await.unwrap() == Status::Running {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    engine.plans.stop(&plan.id).await.unwrap();
    assert_eq!(engine.plans.status(&plan.id).await.unwrap(), Status::Stopped);

    // the gate finishes, but no further task starts after stop
    tokio::time::sleep(Duration::from_millis(700)).await;
    assert!(!controller.runs().contains(&"t2".to_string()));
    assert_eq!(engine.plans.status(&plan.id).await.unwrap(), Status::Stopped);
}

#[tokio::test]
async fn plan_registry_crud_round_trip() {
    let (engine, _, _) = engine_with_mocks(Config::default()).await;
    register_component(&engine, "c1").await;

    let plan = engine
        .plans
        .register(vec![update_task("t1", "c1")])
        .await
        .unwrap();

    assert_eq!(engine.plans.list().await.len(), 1);
    assert_eq!(engine.plans.get(&plan.id).await.unwrap().id, plan.id);

    engine.plans.delete(&plan.id).await.unwrap();
    assert!(matches!(
        engine.plans.get(&plan.id).await.unwrap_err(),
        RegistryError::NotFound { .. }
    ));
}

#[tokio::test]
async fn graphs_of_one_plan_run_concurrently() {
    let (engine, _, _) = engine_with_mocks(Config::default()).await;
    register_component(&engine, "c1").await;

    let slow = |id: &str| {
        let mut meta = op(id);
        meta.insert("sleep_ms".into(), "200".into());
        Task::new(id, TaskKind::Update, vec!["c1".into()]).with_metadata(meta)
    };

    let plan = engine
        .plans
        .register(vec![slow("g1"), slow("g2"), slow("g3")])
        .await
        .unwrap();
    assert_eq!(plan.task_graphs.len(), 3);

    let started = std::time::Instant::now();
    engine.plans.run(&plan.id, None).await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(engine.plans.status(&plan.id).await.unwrap(), Status::Success);
    // three 200ms graphs in parallel finish well under the 600ms serial time
    assert!(
        elapsed < Duration::from_millis(500),
        "graphs appear to have run serially: {elapsed:?}"
    );
}

#[tokio::test]
async fn graph_concurrency_can_be_capped() {
    let config = Config {
        max_concurrent_graphs: 1,
        ..Config::default()
    };
    let (engine, controller, _) = engine_with_mocks(config).await;
    register_component(&engine, "c1").await;

    let plan = engine
        .plans
        .register(vec![update_task("g1", "c1"), update_task("g2", "c1")])
        .await
        .unwrap();
    assert_eq!(plan.task_graphs.len(), 2);

    engine.plans.run(&plan.id, None).await.unwrap();
    assert_eq!(engine.plans.status(&plan.id).await.unwrap(), Status::Success);
    assert_eq!(controller.runs().len(), 2);
}
