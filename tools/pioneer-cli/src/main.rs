use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use pioneer_core::{endpoints, Agent, Workflow, WorkflowId};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Parser, Debug)]
#[command(name = "pioneer")]
#[command(about = "Pioneer CLI - Agent and workflow management")]
#[command(version = pioneer_core::VERSION)]
struct Cli {
    /// Controller base URL
    #[arg(
        long,
        global = true,
        env = "PIONEER_PLATFORM_URL",
        default_value = "http://localhost:8080"
    )]
    platform_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Agent inspection commands
    Agents {
        #[command(subcommand)]
        action: AgentAction,
    },
    /// Workflow commands
    Workflow {
        #[command(subcommand)]
        action: WorkflowAction,
    },
    /// Platform status and monitoring
    Status,
}

#[derive(Subcommand, Debug)]
enum AgentAction {
    /// List all agents
    List,
    /// Show agent details
    Show { id: String },
}

#[derive(Subcommand, Debug)]
enum WorkflowAction {
    /// Start a knowledge-base workflow on an agent
    Start {
        #[arg(long)]
        agent: String,
        #[arg(long)]
        kb: String,
    },
    /// Show a workflow's current state
    Show { id: WorkflowId },
    /// List all workflows
    List,
}

#[derive(Deserialize)]
struct AgentList {
    agents: Vec<Agent>,
}

#[derive(Deserialize)]
struct WorkflowList {
    workflows: Vec<Workflow>,
}

#[derive(Deserialize)]
struct Started {
    workflow_id: WorkflowId,
}

struct PlatformClient {
    http: reqwest::Client,
    base_url: String,
}

impl PlatformClient {
    fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> anyhow::Result<T> {
        let response = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await
            .with_context(|| format!("requesting {}", path))?;
        decode(response).await
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, body: &Value) -> anyhow::Result<T> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .json(body)
            .send()
            .await
            .with_context(|| format!("requesting {}", path))?;
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> anyhow::Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body: Value = response.json().await.unwrap_or(Value::Null);
        bail!("{}", error_message(status, &body));
    }
    Ok(response.json().await?)
}

fn error_message(status: StatusCode, body: &Value) -> String {
    match body["error"]["message"].as_str() {
        Some(message) => format!("platform returned {}: {}", status, message),
        None => format!("platform returned {}", status),
    }
}

fn agent_row(agent: &Agent) -> String {
    format!(
        "{:<38} {:<20} {:<16} {:<8} {}",
        agent.id,
        agent.hostname,
        agent.ip_address,
        agent.status.to_string(),
        agent.last_seen.format("%Y-%m-%d %H:%M:%S")
    )
}

fn workflow_row(workflow: &Workflow) -> String {
    let current = workflow
        .current_task_id
        .map(|id| id.to_string())
        .unwrap_or_else(|| "-".to_string());
    format!(
        "{:<38} {:<12} {:<38} {:<12} {}",
        workflow.id,
        workflow.status.as_str(),
        workflow.agent_id,
        workflow.kb_id,
        current
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let client = PlatformClient::new(&cli.platform_url);

    match cli.command {
        Commands::Agents { action } => handle_agent_action(&client, action).await,
        Commands::Workflow { action } => handle_workflow_action(&client, action).await,
        Commands::Status => handle_status(&client).await,
    }
}

async fn handle_agent_action(client: &PlatformClient, action: AgentAction) -> anyhow::Result<()> {
    match action {
        AgentAction::List => {
            let list: AgentList = client.get(endpoints::API_V1_AGENTS).await?;
            println!("🤖 {} agent(s)", list.agents.len());
            for agent in &list.agents {
                println!("{}", agent_row(agent));
            }
        }
        AgentAction::Show { id } => {
            let agent: Agent = client
                .get(&format!("{}/{}", endpoints::API_V1_AGENTS, id))
                .await?;
            println!("🔍 Agent {}", agent.id);
            println!("{}", serde_json::to_string_pretty(&agent)?);
        }
    }
    Ok(())
}

async fn handle_workflow_action(
    client: &PlatformClient,
    action: WorkflowAction,
) -> anyhow::Result<()> {
    match action {
        WorkflowAction::Start { agent, kb } => {
            let started: Started = client
                .post(
                    endpoints::API_V1_WORKFLOWS,
                    &json!({ "agent_id": agent, "kb_id": kb }),
                )
                .await?;
            println!("🚀 Started workflow {}", started.workflow_id);
        }
        WorkflowAction::Show { id } => {
            let workflow: Workflow = client
                .get(&format!("{}/{}", endpoints::API_V1_WORKFLOWS, id))
                .await?;
            println!("🔍 Workflow {} is {}", workflow.id, workflow.status);
            println!("{}", serde_json::to_string_pretty(&workflow)?);
        }
        WorkflowAction::List => {
            let list: WorkflowList = client.get(endpoints::API_V1_WORKFLOWS).await?;
            println!("📋 {} workflow(s)", list.workflows.len());
            for workflow in &list.workflows {
                println!("{}", workflow_row(workflow));
            }
        }
    }
    Ok(())
}

async fn handle_status(client: &PlatformClient) -> anyhow::Result<()> {
    let health: Value = client.get(endpoints::HEALTH).await?;
    let metrics: Value = client.get(endpoints::METRICS).await?;

    println!("📊 Pioneer Platform Status");
    println!(
        "🎯 Platform: {} (version {})",
        health["status"].as_str().unwrap_or("unknown"),
        health["version"].as_str().unwrap_or("unknown")
    );
    println!(
        "🎯 Agents: {} online of {}",
        metrics["agents"]["online"], metrics["agents"]["total"]
    );
    println!(
        "🎯 Pending tasks: {} across {} queue(s)",
        metrics["task_queues"]["pending_tasks"], metrics["task_queues"]["queues"]
    );
    println!("🎯 Workflows: {}", metrics["workflows"]);
    Ok(())
}
