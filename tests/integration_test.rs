use async_trait::async_trait;
use ctxmesh::context::{Prompt, Responder};
use ctxmesh::{ClusterConfig, CommandRouter, Routing};
use ctxmesh_common::{ContextId, EntryKind, Envelope, ErrorKind, Reply, ServerId};
use std::sync::Arc;
use std::time::Duration;

fn router() -> CommandRouter {
    CommandRouter::new(ClusterConfig::default()).unwrap()
}

fn reply(envelope: Envelope) -> Reply {
    match envelope.into_result() {
        Ok(reply) => reply,
        Err(e) => panic!("command failed: {:?}", e),
    }
}

fn responders(envelope: Envelope) -> Vec<u32> {
    match reply(envelope) {
        Reply::RoundOpened { responses, .. } => responses.keys().map(|s| s.0).collect(),
        other => panic!("expected an open round, got {:?}", other),
    }
}

fn kinds(router: &CommandRouter, context: u64, server: u32) -> Vec<(&'static str, String)> {
    router
        .store()
        .replica(ContextId(context), ServerId(server))
        .unwrap_or_default()
        .into_iter()
        .map(|e| match e.kind {
            EntryKind::Query { text } => ("query", text),
            EntryKind::Response { text } => ("response", text),
        })
        .collect()
}

#[tokio::test]
async fn test_partitioned_round_and_resync() {
    let router = router();

    assert!(router.execute("create 1").await.ok);
    assert!(router.execute("failLink 0 1").await.ok);

    let round = router.execute("query 1 hello").await;
    assert_eq!(responders(round), vec![0, 2]);

    let chosen = reply(router.execute("choose 1 0").await);
    match chosen {
        Reply::Chosen {
            server,
            response,
            committed,
            ..
        } => {
            assert_eq!(server, ServerId(0));
            assert_eq!(response, "server 0 (turn 1): hello");
            assert_eq!(committed, vec![ServerId(0), ServerId(2)]);
        }
        other => panic!("unexpected reply {:?}", other),
    }

    assert_eq!(
        kinds(&router, 1, 0),
        vec![
            ("query", "hello".to_string()),
            ("response", "server 0 (turn 1): hello".to_string()),
        ]
    );
    assert!(kinds(&router, 1, 1).is_empty());

    assert!(router.execute("fixLink 0 1").await.ok);
    match reply(router.execute("resync 1").await) {
        Reply::Resynced { updated, .. } => assert_eq!(updated, vec![ServerId(1)]),
        other => panic!("unexpected reply {:?}", other),
    }
    assert_eq!(kinds(&router, 1, 1), kinds(&router, 1, 0));
}

#[tokio::test]
async fn test_healed_link_does_not_receive_commit_without_query() {
    let router = router();
    for line in ["create 1", "failLink 0 1", "query 1 hello", "fixLink 0 1"] {
        assert!(router.execute(line).await.ok, "{}", line);
    }

    match reply(router.execute("choose 1 0").await) {
        Reply::Chosen { committed, .. } => {
            assert_eq!(committed, vec![ServerId(0), ServerId(2)])
        }
        other => panic!("unexpected reply {:?}", other),
    }
    assert!(kinds(&router, 1, 1).is_empty());

    // Resync still repairs the skipped replica as a whole
    match reply(router.execute("resync 1").await) {
        Reply::Resynced { updated, .. } => assert_eq!(updated, vec![ServerId(1)]),
        other => panic!("unexpected reply {:?}", other),
    }
    assert_eq!(kinds(&router, 1, 1), kinds(&router, 1, 0));
}

#[tokio::test]
async fn test_commit_attributes_chosen_server() {
    let router = router();
    router.execute("create 5").await;
    router.execute("query 5 which way").await;
    router.execute("choose 5 2").await;

    for server in 0..3 {
        let replica = router
            .store()
            .replica(ContextId(5), ServerId(server))
            .unwrap();
        assert_eq!(replica.len(), 2);
        assert!(replica[0].is_query());
        assert_eq!(replica[0].origin, ServerId(0));
        assert!(!replica[1].is_query());
        assert_eq!(replica[1].origin, ServerId(2));
        assert!(replica[0].seq < replica[1].seq);
    }
}

#[tokio::test]
async fn test_duplicate_create() {
    let router = router();
    assert!(router.execute("create 1").await.ok);
    assert_eq!(
        router.execute("create 1").await.error_kind(),
        Some(ErrorKind::DuplicateContext)
    );
}

#[tokio::test]
async fn test_query_without_reachable_holders() {
    let router = router();
    router.execute("create 1").await;
    router.execute("failNode 0").await;

    assert_eq!(
        router.execute("query 1 anyone").await.error_kind(),
        Some(ErrorKind::NoReachableServer)
    );
    assert!(router.arbiter().open_round(ContextId(1)).is_none());
    assert_eq!(
        router.execute("choose 1 1").await.error_kind(),
        Some(ErrorKind::UnknownRound)
    );
}

#[tokio::test]
async fn test_query_unknown_context() {
    let router = router();
    assert_eq!(
        router.execute("query 9 hello").await.error_kind(),
        Some(ErrorKind::UnknownContext)
    );
    assert_eq!(
        router.execute("view 9").await.error_kind(),
        Some(ErrorKind::UnknownContext)
    );
}

#[tokio::test]
async fn test_invalid_choice_keeps_round_open() {
    let router = router();
    router.execute("create 1").await;
    router.execute("failLink 0 2").await;
    router.execute("query 1 hi").await;

    assert_eq!(
        router.execute("choose 1 2").await.error_kind(),
        Some(ErrorKind::InvalidChoice)
    );
    assert!(router.execute("choose 1 1").await.ok);
    // The round closed with the successful choice
    assert_eq!(
        router.execute("choose 1 1").await.error_kind(),
        Some(ErrorKind::UnknownRound)
    );
}

#[tokio::test]
async fn test_failed_node_cannot_be_chosen() {
    let router = router();
    router.execute("create 1").await;
    assert_eq!(
        responders(router.execute("query 1 hi").await),
        vec![0, 1, 2]
    );

    router.execute("failNode 1").await;
    assert_eq!(
        router.execute("choose 1 1").await.error_kind(),
        Some(ErrorKind::InvalidChoice)
    );

    match reply(router.execute("choose 1 2").await) {
        Reply::Chosen { committed, .. } => {
            assert_eq!(committed, vec![ServerId(0), ServerId(2)])
        }
        other => panic!("unexpected reply {:?}", other),
    }
}

#[tokio::test]
async fn test_new_query_supersedes_open_round() {
    let router = router();
    router.execute("create 1").await;
    router.execute("query 1 first").await;
    router.execute("query 1 second").await;

    match reply(router.execute("choose 1 0").await) {
        Reply::Chosen { response, .. } => assert_eq!(response, "server 0 (turn 2): second"),
        other => panic!("unexpected reply {:?}", other),
    }
    assert_eq!(router.metrics().open_rounds(), 0);
}

#[tokio::test]
async fn test_link_state_follows_last_transition() {
    let router = router();
    for line in ["failLink 0 1", "fixLink 1 0", "failLink 1 0", "failLink 0 1"] {
        assert!(router.execute(line).await.ok);
    }
    assert!(!router
        .cluster()
        .topology()
        .is_up(ServerId(0), ServerId(1))
        .unwrap());

    router.execute("fixLink 0 1").await;
    assert!(router
        .cluster()
        .topology()
        .is_up(ServerId(1), ServerId(0))
        .unwrap());
}

#[tokio::test]
async fn test_create_skips_unreachable_servers() {
    let router = router();
    router.execute("failLink 0 2").await;

    match reply(router.execute("create 3").await) {
        Reply::Created { servers, .. } => assert_eq!(servers, vec![ServerId(0), ServerId(1)]),
        other => panic!("unexpected reply {:?}", other),
    }
    match reply(router.execute("view 3").await) {
        Reply::Context { replicas, .. } => {
            assert_eq!(replicas.keys().copied().collect::<Vec<_>>(), vec![ServerId(0), ServerId(1)])
        }
        other => panic!("unexpected reply {:?}", other),
    }
}

#[tokio::test]
async fn test_multi_hop_routing() {
    let config = ClusterConfig {
        routing: Routing::MultiHop,
        ..ClusterConfig::default()
    };
    let router = CommandRouter::new(config).unwrap();
    router.execute("failLink 0 1").await;

    // Server 1 is still reachable through server 2
    match reply(router.execute("create 1").await) {
        Reply::Created { servers, .. } => assert_eq!(servers.len(), 3),
        other => panic!("unexpected reply {:?}", other),
    }

    router.execute("failNode 2").await;
    assert_eq!(responders(router.execute("query 1 hi").await), vec![0]);
}

#[tokio::test]
async fn test_viewall_lists_every_context() {
    let router = router();
    router.execute("create 2").await;
    router.execute("create 1").await;

    match reply(router.execute("viewall").await) {
        Reply::AllContexts { contexts } => {
            assert_eq!(
                contexts.keys().copied().collect::<Vec<_>>(),
                vec![ContextId(1), ContextId(2)]
            );
        }
        other => panic!("unexpected reply {:?}", other),
    }
}

struct StallingServer {
    server: ServerId,
}

#[async_trait]
impl Responder for StallingServer {
    async fn respond(&self, prompt: Prompt) -> anyhow::Result<String> {
        if prompt.server == self.server {
            tokio::time::sleep(Duration::from_secs(600)).await;
        }
        Ok(format!("{} says {}", prompt.server, prompt.query))
    }

    fn name(&self) -> &str {
        "stalling"
    }
}

#[tokio::test(start_paused = true)]
async fn test_slow_server_is_absent_from_round() {
    let config = ClusterConfig {
        fanout_timeout_ms: 1_000,
        ..ClusterConfig::default()
    };
    let router = CommandRouter::with_responder(
        config,
        Arc::new(StallingServer {
            server: ServerId(1),
        }),
    )
    .unwrap();

    router.execute("create 1").await;
    assert_eq!(responders(router.execute("query 1 hi").await), vec![0, 2]);
    assert_eq!(
        router.execute("choose 1 1").await.error_kind(),
        Some(ErrorKind::InvalidChoice)
    );
}

#[tokio::test]
async fn test_envelope_json_shape() {
    let router = router();
    let envelope = router.execute("choose 1 0").await;
    let json = serde_json::to_value(&envelope).unwrap();
    assert_eq!(json["ok"], false);
    assert_eq!(json["error"]["errorKind"], "UnknownRound");

    let envelope = router.execute("create 1").await;
    let json = serde_json::to_value(&envelope).unwrap();
    assert_eq!(json["data"]["type"], "created");
    assert_eq!(json["data"]["servers"], serde_json::json!([0, 1, 2]));
}

#[test]
fn test_version_const() {
    assert!(!ctxmesh::VERSION.is_empty());
}
