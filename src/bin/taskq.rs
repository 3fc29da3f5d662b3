//! taskq CLI: operator interface to the dispatch pipeline.

use clap::{Parser, Subcommand};
use secrecy::ExposeSecret;
use std::sync::Arc;
use taskq::broker::{AmqpBroker, Publisher};
use taskq::config::Config;
use taskq::db::Db;
use taskq::engine::{ControlConfig, ControlPlane};
use taskq::model::{DispatchEvent, NewTask, Status, TaskId};
use taskq::store::{MemoryStore, TaskStore};
use taskq::telemetry::{TelemetryConfig, init_telemetry};

#[derive(Parser)]
#[command(name = "taskq", about = "Task dispatch pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the worker pool and dispatchers
    Serve {
        /// Use an in-process store instead of Postgres
        #[arg(long)]
        memory: bool,
        /// Disable the periodic pending scan
        #[arg(long)]
        no_poller: bool,
        /// Disable the broker consumer
        #[arg(long)]
        no_consumer: bool,
    },
    /// Task operations
    Task {
        #[command(subcommand)]
        action: TaskAction,
    },
}

#[derive(Subcommand)]
enum TaskAction {
    /// Create a task
    Create {
        name: String,
        description: String,
        /// Initial status (only pending tasks are dispatched)
        #[arg(long, default_value = "pending")]
        status: String,
        /// Publish a dispatch event after creating the task
        #[arg(long)]
        publish: bool,
        /// Routing hint for the event ("long" for long-running work)
        #[arg(long)]
        hint: Option<String>,
    },
    /// List tasks
    List,
    /// Show a task
    Show { id: String },
    /// Delete a task
    Delete { id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Command::Serve {
            memory,
            no_poller,
            no_consumer,
        } => cmd_serve(config, memory, no_poller, no_consumer).await,
        Command::Task { action } => {
            let db = connect_db(&config).await?;
            match action {
                TaskAction::Create {
                    name,
                    description,
                    status,
                    publish,
                    hint,
                } => cmd_task_create(&config, &db, name, description, status, publish, hint).await,
                TaskAction::List => cmd_task_list(&db).await,
                TaskAction::Show { id } => cmd_task_show(&db, id.parse()?).await,
                TaskAction::Delete { id } => cmd_task_delete(&db, id.parse()?).await,
            }
        }
    }
}

async fn connect_db(config: &Config) -> anyhow::Result<Db> {
    let db = Db::connect(config.require_database_url()?.expose_secret()).await?;
    db.migrate().await?;
    Ok(db)
}

async fn cmd_serve(
    config: Config,
    memory: bool,
    no_poller: bool,
    no_consumer: bool,
) -> anyhow::Result<()> {
    let guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "taskq".to_string(),
        log_level: config.log_level.clone(),
    })?;

    let store: Arc<dyn TaskStore> = if memory {
        tracing::warn!("using in-memory store; tasks are lost on exit");
        Arc::new(MemoryStore::new())
    } else {
        let db = connect_db(&config).await?;
        db.health_check().await?;
        Arc::new(db)
    };

    let mut control_config = ControlConfig::from_config(&config);
    control_config.poller = !no_poller;
    let control = ControlPlane::new(store, control_config);

    let ctrl = control.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        ctrl.shutdown();
    });

    let broker = (!no_consumer).then(|| AmqpBroker::new(config.broker.clone()));
    control.run(broker).await;
    guard.force_flush();
    Ok(())
}

async fn cmd_task_create(
    config: &Config,
    db: &Db,
    name: String,
    description: String,
    status: String,
    publish: bool,
    hint: Option<String>,
) -> anyhow::Result<()> {
    let status: Status = status.parse()?;
    let task = db.create(NewTask::new(name, description).status(status)).await?;
    println!("Created: {} (status: {})", task.id, task.status);

    if publish {
        let mut event = DispatchEvent::new(task.id);
        if let Some(hint) = hint {
            event = event.hint(hint);
        }
        // Best-effort: the task is already stored.
        match Publisher::connect(&config.broker).await {
            Ok(publisher) => {
                if let Err(e) = publisher.publish(&event).await {
                    eprintln!("warning: dispatch event not published: {e}");
                } else {
                    println!("Published dispatch event for task {}", task.id);
                }
                publisher.close().await.ok();
            }
            Err(e) => eprintln!("warning: broker unavailable, event not published: {e}"),
        }
    }

    Ok(())
}

async fn cmd_task_list(db: &Db) -> anyhow::Result<()> {
    let tasks = db.list().await?;
    if tasks.is_empty() {
        println!("No tasks found.");
        return Ok(());
    }

    println!("{:<8}  {:<12}  {:<24}  DESCRIPTION", "ID", "STATUS", "NAME");
    println!("{}", "-".repeat(80));
    for task in &tasks {
        let name: String = task.name.chars().take(24).collect();
        println!(
            "{:<8}  {:<12}  {:<24}  {}",
            task.id, task.status, name, task.description
        );
    }
    println!("\n{} task(s)", tasks.len());
    Ok(())
}

async fn cmd_task_show(db: &Db, id: TaskId) -> anyhow::Result<()> {
    let task = db.get(id).await?;
    println!("ID:          {}", task.id);
    println!("Name:        {}", task.name);
    println!("Status:      {}", task.status);
    println!("Description: {}", task.description);
    println!("Created:     {}", task.created_at.to_rfc3339());
    println!("Updated:     {}", task.updated_at.to_rfc3339());
    Ok(())
}

async fn cmd_task_delete(db: &Db, id: TaskId) -> anyhow::Result<()> {
    db.delete(id).await?;
    println!("Deleted: {id}");
    Ok(())
}
