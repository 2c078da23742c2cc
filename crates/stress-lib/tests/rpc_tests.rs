//! Agent RPC over a real loopback listener

use std::sync::Arc;
use stress_lib::error::RpcError;
use stress_lib::load::LoadController;
use stress_lib::models::{AgentEndpoint, AgentId};
use stress_lib::rpc::{
    self, AgentConnector, AgentRpc, EndpointResolver, HttpAgentClient, HttpAgentConnector,
};

async fn spawn_agent() -> (String, LoadController) {
    let controller = LoadController::new();
    let app = rpc::router(controller.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), controller)
}

struct StaticResolver {
    service_name: String,
    base_url: String,
}

impl EndpointResolver for StaticResolver {
    fn resolve(&self, endpoint: &AgentEndpoint) -> Option<String> {
        (endpoint.service_name == self.service_name).then(|| self.base_url.clone())
    }
}

#[tokio::test]
async fn test_client_pushes_clamped_targets() {
    let (base_url, controller) = spawn_agent().await;
    let client = HttpAgentClient::new(reqwest::Client::new(), format!("{}/", base_url));

    assert_eq!(client.set_memory_allocation_target_in_mb(-5).await.unwrap(), 1);
    assert_eq!(client.set_cpu_target_percentage(150).await.unwrap(), 100);
    assert!(client.start_stressing().await.unwrap());

    assert_eq!(controller.memory_target_mb(), 1);
    assert_eq!(controller.cpu_target(), 100);
    assert!(controller.is_active());

    assert!(!client.stop_stressing().await.unwrap());
    assert!(!controller.is_active());
}

#[tokio::test]
async fn test_connector_resolves_known_agents_only() {
    let (base_url, controller) = spawn_agent().await;
    let known = AgentEndpoint::for_agent("rpc-test", AgentId::new());
    let unknown = AgentEndpoint::for_agent("rpc-test", AgentId::new());

    let connector = HttpAgentConnector::new(Arc::new(StaticResolver {
        service_name: known.service_name.clone(),
        base_url,
    }))
    .unwrap();

    let agent = connector.connect(&known).await.unwrap();
    assert_eq!(agent.set_cpu_target_percentage(35).await.unwrap(), 35);
    assert_eq!(controller.cpu_target(), 35);

    assert!(matches!(
        connector.connect(&unknown).await,
        Err(RpcError::Unresolved(_))
    ));
}

#[tokio::test]
async fn test_non_success_status_is_surfaced() {
    let (base_url, _controller) = spawn_agent().await;
    let client = HttpAgentClient::new(reqwest::Client::new(), format!("{}/missing", base_url));

    let result = client.start_stressing().await;

    assert!(matches!(result, Err(RpcError::Status { status: 404, .. })));
}
