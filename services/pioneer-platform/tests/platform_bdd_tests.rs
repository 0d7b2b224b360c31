use clap::Parser;
use cucumber::{given, then, when, World};
use pioneer_core::{
    FileKnowledgeBase, KnowledgeBaseItem, MemoryRegistry, Task, TaskResult, WorkflowId,
};
use pioneer_platform::{api, PlatformConfig, PlatformState};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

#[derive(World)]
#[world(init = Self::new)]
struct PlatformWorld {
    base_url: Option<String>,
    client: reqwest::Client,
    agent_ids: Vec<String>,
    last_status: Option<u16>,
    workflow_id: Option<WorkflowId>,
    polled: Option<Task>,
}

impl std::fmt::Debug for PlatformWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformWorld")
            .field("base_url", &self.base_url)
            .field("agent_ids", &self.agent_ids)
            .field("last_status", &self.last_status)
            .field("workflow_id", &self.workflow_id)
            .finish()
    }
}

impl PlatformWorld {
    fn new() -> Self {
        Self {
            base_url: None,
            client: reqwest::Client::new(),
            agent_ids: Vec::new(),
            last_status: None,
            workflow_id: None,
            polled: None,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.as_deref().expect("Platform not started"), path)
    }

    fn agent_id(&self) -> String {
        self.agent_ids.last().cloned().expect("No agent registered")
    }

    async fn workflow_status(&self) -> String {
        let id = self.workflow_id.expect("No workflow started");
        let body: Value = self
            .client
            .get(self.url(&format!("/api/v1/workflows/{}", id)))
            .send()
            .await
            .expect("Failed to fetch workflow")
            .json()
            .await
            .expect("Workflow body was not JSON");
        body["status"].as_str().unwrap_or_default().to_string()
    }
}

#[given(
    regex = r#"^a running platform with knowledge base item (\S+) diagnosing with "([^"]*)" and remediating with "([^"]*)"$"#
)]
async fn given_running_platform(
    world: &mut PlatformWorld,
    kb_id: String,
    diagnostic: String,
    remediation: String,
) {
    let config = PlatformConfig::try_parse_from(["pioneer-platform", "--poll-timeout-secs", "1"])
        .expect("Invalid platform config");
    let knowledge_base = FileKnowledgeBase::from_items([KnowledgeBaseItem::new(
        kb_id,
        vec![diagnostic.as_str()],
        Some(remediation.as_str()),
    )]);
    let (state, processor) = PlatformState::build(
        &config,
        Arc::new(MemoryRegistry::new()),
        Arc::new(knowledge_base),
    );

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().expect("No local address");
    tokio::spawn(async move {
        let _processor = processor;
        axum::serve(listener, api::router(state))
            .await
            .expect("Platform server failed");
    });
    world.base_url = Some(format!("http://{}", addr));
}

#[when(expr = "host {word} at {word} registers")]
async fn when_host_registers(world: &mut PlatformWorld, hostname: String, ip_address: String) {
    let response = world
        .client
        .post(world.url("/api/v1/agent/register"))
        .json(&json!({ "hostname": hostname, "ip_address": ip_address, "os": "linux" }))
        .send()
        .await
        .expect("Registration request failed");
    world.last_status = Some(response.status().as_u16());
    let body: Value = response.json().await.expect("Registration body was not JSON");
    let agent_id = body["agent_id"].as_str().expect("No agent_id returned");
    world.agent_ids.push(agent_id.to_string());
}

#[when("the agent sends a heartbeat")]
async fn when_agent_heartbeats(world: &mut PlatformWorld) {
    let response = world
        .client
        .post(world.url("/api/v1/agent/heartbeat"))
        .json(&json!({ "agent_id": world.agent_id() }))
        .send()
        .await
        .expect("Heartbeat request failed");
    assert_eq!(response.status().as_u16(), 200);
}

#[when(expr = "a workflow is requested for the agent with knowledge base item {word}")]
async fn when_workflow_requested(world: &mut PlatformWorld, kb_id: String) {
    let response = world
        .client
        .post(world.url("/api/v1/workflows"))
        .json(&json!({ "agent_id": world.agent_id(), "kb_id": kb_id }))
        .send()
        .await
        .expect("Workflow request failed");
    world.last_status = Some(response.status().as_u16());
    if response.status().is_success() {
        let body: Value = response.json().await.expect("Workflow body was not JSON");
        world.workflow_id = body["workflow_id"]
            .as_str()
            .and_then(|id| id.parse().ok());
    }
}

#[when("the agent polls for a task")]
async fn when_agent_polls(world: &mut PlatformWorld) {
    let response = world
        .client
        .get(world.url("/api/v1/agent/tasks"))
        .query(&[("agent_id", world.agent_id())])
        .send()
        .await
        .expect("Poll request failed");
    world.last_status = Some(response.status().as_u16());
    world.polled = if response.status().as_u16() == 200 {
        Some(response.json().await.expect("Task body was not JSON"))
    } else {
        None
    };
}

#[when(expr = "the agent reports {word} for the polled task")]
async fn when_agent_reports(world: &mut PlatformWorld, outcome: String) {
    let task = world.polled.clone().expect("No task was polled");
    let result = match outcome.as_str() {
        "success" => TaskResult::succeeded(task.id, world.agent_id(), "ok\n".into()),
        "failure" => {
            TaskResult::failed(task.id, world.agent_id(), String::new(), "exit status 3", 3)
        }
        other => panic!("Unknown outcome: {}", other),
    };
    let response = world
        .client
        .post(world.url("/api/v1/agent/tasks/results"))
        .json(&result)
        .send()
        .await
        .expect("Result request failed");
    assert_eq!(response.status().as_u16(), 202);
}

#[then(regex = r"^the (?:registration|poll|workflow request) should be answered with (\d+)$")]
async fn then_status(world: &mut PlatformWorld, expected: u16) {
    assert_eq!(world.last_status, Some(expected));
}

#[then("both registrations should share an agent id")]
async fn then_same_agent(world: &mut PlatformWorld) {
    assert_eq!(world.agent_ids.len(), 2);
    assert_eq!(world.agent_ids[0], world.agent_ids[1]);
}

#[then(regex = r#"^the polled task should run "([^"]*)"$"#)]
async fn then_polled_command(world: &mut PlatformWorld, command: String) {
    let task = world.polled.as_ref().expect("No task was polled");
    assert_eq!(task.command, command);
}

#[then(expr = "the workflow should become {word}")]
async fn then_workflow_becomes(world: &mut PlatformWorld, expected: String) {
    let mut status = String::new();
    for _ in 0..50 {
        status = world.workflow_status().await;
        if status == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(40)).await;
    }
    panic!("Workflow stayed {} instead of becoming {}", status, expected);
}

#[tokio::main]
async fn main() {
    PlatformWorld::cucumber()
        .run_and_exit("tests/features")
        .await;
}
