//! Layer bring-up ordering and failure handling.

use metagraph_monitor::models::layer::Layer;
use metagraph_monitor::models::node::NodeState;
use metagraph_monitor::remediation::bringup::bring_up_layer;
use metagraph_monitor::remediation::report::OutcomeStatus;
use metagraph_monitor::AppError;

use super::test_helpers::{ip, test_config, Harness, NodeEvent, Probe, CL1_PORT, ML0_PORT};

fn starting() -> Probe {
    Probe::State(NodeState::Other("SessionStarted".into()))
}

#[tokio::test(start_paused = true)]
async fn validators_join_only_after_bootstrap_is_ready() {
    let harness = Harness::new(test_config(3, true, true));
    harness.nodes.script(
        &ip(1),
        ML0_PORT,
        vec![starting(), starting(), starting(), Probe::State(NodeState::Ready)],
    );
    for n in [2, 3] {
        harness.nodes.script(
            &ip(n),
            ML0_PORT,
            vec![starting(), Probe::State(NodeState::ReadyToJoin)],
        );
    }
    let ctx = harness.context();
    let bootstrap = ctx.config.host("node-1").unwrap();
    let validators = vec![ctx.config.host("node-2").unwrap(), ctx.config.host("node-3").unwrap()];

    let report = bring_up_layer(&ctx, Layer::MetagraphL0, bootstrap, &validators)
        .await
        .unwrap();

    assert!(report.is_clean(), "{}", report.failure_summary());
    let events = harness.nodes.events();
    let ready_at = events
        .iter()
        .position(|e| {
            matches!(e, NodeEvent::Info { ip: i, state: Some(NodeState::Ready), .. } if *i == ip(1))
        })
        .unwrap();
    let first_join = events
        .iter()
        .position(|e| matches!(e, NodeEvent::Join { .. }))
        .unwrap();
    assert!(ready_at < first_join);

    let joins = harness.nodes.joins();
    assert_eq!(
        joins,
        vec![
            (ip(2), format!("peer-{}", ip(1))),
            (ip(3), format!("peer-{}", ip(1))),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn bootstrap_starts_in_rollback_mode_and_validators_in_validator_mode() {
    let harness = Harness::new(test_config(2, true, true));
    harness
        .nodes
        .script(&ip(2), ML0_PORT, vec![Probe::State(NodeState::ReadyToJoin)]);
    let ctx = harness.context();
    let bootstrap = ctx.config.host("node-1").unwrap();
    let validators = vec![ctx.config.host("node-2").unwrap()];

    bring_up_layer(&ctx, Layer::MetagraphL0, bootstrap, &validators)
        .await
        .unwrap();

    assert!(harness.commands_on(1).iter().any(|c| c.contains("run-rollback")));
    assert!(harness.commands_on(2).iter().any(|c| c.contains("run-validator")));
    assert!(!harness.commands_on(2).iter().any(|c| c.contains("run-rollback")));
}

#[tokio::test(start_paused = true)]
async fn dependent_bootstrap_resolves_base_layer_peer_first() {
    let harness = Harness::new(test_config(2, false, true));
    harness
        .nodes
        .script(&ip(2), CL1_PORT, vec![Probe::State(NodeState::ReadyToJoin)]);
    let ctx = harness.context();
    let bootstrap = ctx.config.host("node-1").unwrap();
    let validators = vec![ctx.config.host("node-2").unwrap()];

    bring_up_layer(&ctx, Layer::CurrencyL1, bootstrap, &validators)
        .await
        .unwrap();

    let start = harness
        .commands_on(1)
        .into_iter()
        .find(|c| c.contains("run-initial-validator"))
        .unwrap();
    assert!(start.contains(&format!("CL_L0_PEER_ID='peer-{}'", ip(1))));
    assert!(start.contains("CL_L0_TOKEN_IDENTIFIER='DAG0metagraphtoken'"));
    assert!(harness.nodes.info_calls(&ip(1), ML0_PORT) >= 1);
}

#[tokio::test(start_paused = true)]
async fn failed_validator_does_not_stop_later_validators() {
    let harness = Harness::with_default_probe(
        test_config(3, true, true),
        Probe::State(NodeState::ReadyToJoin),
    );
    harness
        .nodes
        .script(&ip(1), ML0_PORT, vec![Probe::State(NodeState::Ready)]);
    harness.nodes.fail_join(&ip(2));
    let ctx = harness.context();
    let bootstrap = ctx.config.host("node-1").unwrap();
    let validators = vec![ctx.config.host("node-2").unwrap(), ctx.config.host("node-3").unwrap()];

    let report = bring_up_layer(&ctx, Layer::MetagraphL0, bootstrap, &validators)
        .await
        .unwrap();

    let failed: Vec<_> = report.failures().map(|o| o.host.clone()).collect();
    assert_eq!(failed, vec!["node-2".to_owned()]);
    let node3 = report
        .outcomes
        .iter()
        .find(|o| o.host == "node-3" && o.step == "join")
        .unwrap();
    assert_eq!(node3.status, OutcomeStatus::Succeeded);
}

#[tokio::test(start_paused = true)]
async fn bootstrap_that_never_converges_aborts_without_joins() {
    let harness = Harness::with_default_probe(test_config(3, true, true), starting());
    let ctx = harness.context();
    let bootstrap = ctx.config.host("node-1").unwrap();
    let validators = vec![ctx.config.host("node-2").unwrap(), ctx.config.host("node-3").unwrap()];

    let err = bring_up_layer(&ctx, Layer::MetagraphL0, bootstrap, &validators)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::ConvergenceTimeout(_)));
    assert!(harness.nodes.joins().is_empty());
    assert!(!harness.commands_on(2).iter().any(|c| c.contains("nohup java")));
}
