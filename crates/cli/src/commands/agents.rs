//! Agent lifecycle commands

use anyhow::Result;
use tabled::Tabled;

use crate::client::{
    AgentRecord, ApiClient, CreateOutcome, DeleteAllResponse, DeleteResponse, StressRequest,
};
use crate::output::{
    color_active, format_memory_mb, format_percent, print_error, print_info, print_success,
    print_warning, OutputFormat,
};

/// Row for the agents table
#[derive(Tabled)]
struct AgentRow {
    #[tabled(rename = "Agent ID")]
    agent_id: String,
    #[tabled(rename = "CPU")]
    cpu: String,
    #[tabled(rename = "Memory")]
    memory: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Created")]
    created_at: String,
}

/// Row for the failures table
#[derive(Tabled)]
struct FailureRow {
    #[tabled(rename = "Agent ID")]
    agent_id: String,
    #[tabled(rename = "Reason")]
    reason: String,
    #[tabled(rename = "Error")]
    error: String,
}

/// Provision a batch of agents
pub async fn create_agents(
    client: &ApiClient,
    request: StressRequest,
    format: OutputFormat,
) -> Result<()> {
    if matches!(format, OutputFormat::Table) {
        print_info(&format!(
            "Creating {} agent(s) at {} CPU, {}",
            request.number_of_agents_to_create,
            format_percent(request.cpu_target),
            format_memory_mb(request.memory_target)
        ));
    }

    let outcome = client.create_agents(&request).await?;

    match (outcome, format) {
        (CreateOutcome::Created(ids), OutputFormat::Json) => {
            println!("{}", serde_json::to_string_pretty(&ids)?);
        }
        (CreateOutcome::Partial(report), OutputFormat::Json) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
            anyhow::bail!("{} agent(s) failed to provision", report.failures.len());
        }
        (CreateOutcome::Created(ids), OutputFormat::Table) => {
            for id in &ids {
                println!("  {}", id);
            }
            print_success(&format!("Created {} agent(s)", ids.len()));
        }
        (CreateOutcome::Partial(report), OutputFormat::Table) => {
            for id in &report.created {
                println!("  {}", id);
            }
            print_warning(&format!(
                "Created {} agent(s), {} failed",
                report.created.len(),
                report.failures.len()
            ));

            let rows: Vec<FailureRow> = report
                .failures
                .iter()
                .map(|f| FailureRow {
                    agent_id: f.agent_id.clone(),
                    reason: f.reason.clone(),
                    error: f.error.clone(),
                })
                .collect();
            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);

            anyhow::bail!("{} agent(s) failed to provision", report.failures.len());
        }
    }

    Ok(())
}

/// List tracked agents
pub async fn list_agents(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let records: Vec<AgentRecord> = client.get("api/stress").await?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        OutputFormat::Table => {
            if records.is_empty() {
                print_warning("No agents found");
                return Ok(());
            }

            let rows: Vec<AgentRow> = records
                .iter()
                .map(|r| AgentRow {
                    agent_id: r.agent_id.clone(),
                    cpu: format_percent(r.request.cpu_target),
                    memory: format_memory_mb(r.request.memory_target),
                    state: color_active(r.request.is_active),
                    created_at: r.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                })
                .collect();

            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);
            println!("\nTotal: {} agents", records.len());
        }
    }

    Ok(())
}

/// Delete one agent
pub async fn delete_agent(client: &ApiClient, agent_id: &str, format: OutputFormat) -> Result<()> {
    let response: DeleteResponse = client.delete(&format!("api/stress/{}", agent_id)).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&response)?),
        OutputFormat::Table if response.deleted => {
            print_success(&format!("Deleted agent {}", response.agent_id));
        }
        OutputFormat::Table => {
            print_warning(&format!("Agent {} was not tracked", response.agent_id));
        }
    }

    Ok(())
}

/// Delete every tracked agent
pub async fn delete_all_agents(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let response: DeleteAllResponse = client.delete("api/stress").await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&response)?),
        OutputFormat::Table if response.deleted == 0 => print_warning("No agents to delete"),
        OutputFormat::Table => print_success(&format!("Deleted {} agent(s)", response.deleted)),
    }

    Ok(())
}

/// Report a failed command
pub fn report_error(err: &anyhow::Error) {
    print_error(&format!("{:#}", err));
}
