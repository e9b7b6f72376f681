use anyhow::{Context, Result};
use clap::Args;
use colored::*;
use serde_json::{Value, json};
use std::sync::Arc;

use fleet_coordinator::api::{EntityType, SqliteGateway};
use fleet_coordinator::cancel::CancellationScope;
use fleet_coordinator::config::Config;
use fleet_coordinator::fleet::Fleet;
use fleet_coordinator::view::{ActivationOutcome, ShellEvent, StatusReporter, ViewLifecycleManager};

#[derive(Args)]
pub struct BrowseArgs {
    /// View to open (routes, drivers, vehicles); defaults to navigation.initial_view
    pub view: Option<String>,
    /// Number of pages to load (the first, then extensions)
    #[arg(long, default_value_t = 1)]
    pub pages: usize,
    /// Page size; defaults to paging.default_page_size
    #[arg(long)]
    pub page_size: Option<usize>,
    /// Keep extending while row N (0-based) is within paging.prefetch_threshold of the end
    #[arg(long)]
    pub scroll_to: Option<usize>,
}

pub async fn browse_command(args: BrowseArgs, config: &Config) -> Result<()> {
    let view = args.view.unwrap_or_else(|| config.navigation.initial_view.clone());
    let gateway = Arc::new(SqliteGateway::connect(&config.database_path()?).await?);

    let (status, mut events) = StatusReporter::channel();
    let fleet = Fleet::new(gateway, config, status.clone());
    let mut manager = ViewLifecycleManager::new(CancellationScope::root("shell"))
        .with_refresh_on_reactivate(config.navigation.refresh_on_reactivate)
        .with_status(status);
    fleet.register_views(&mut manager);

    let parameter = match args.page_size {
        Some(size) => json!({ "page_size": size }),
        None => Value::Null,
    };
    let outcome = manager.activate(&view, parameter).await;
    print_events(&mut events);

    match outcome.with_context(|| format!("Failed to open view '{}'", view))? {
        ActivationOutcome::Degraded { reason } => {
            println!("  {} Showing last known data: {}", "⚠️".bright_yellow().bold(), reason);
        }
        other => log::debug!("Activation of '{}': {:?}", view, other),
    }

    let entity = EntityType::from_name(&view).with_context(|| format!("'{}' is not an entity view", view))?;
    let collection = fleet.collection(entity);
    let scope = manager.active_scope().await.context("View is no longer active")?;

    for _ in 1..args.pages.max(1) {
        if collection.snapshot().is_complete() {
            break;
        }
        if let Err(e) = collection.loader().extend(&scope).await {
            println!("  {} {}", "⚠️".bright_yellow().bold(), e);
            break;
        }
    }

    if let Some(row) = args.scroll_to {
        while collection.snapshot().needs_more(row, config.paging.prefetch_threshold) {
            let before = collection.snapshot().len();
            match collection.loader().extend(&scope).await {
                // An empty page below the reported total ends the scroll
                Ok(state) if state.len() == before => break,
                Ok(_) => {}
                Err(e) => {
                    println!("  {} {}", "⚠️".bright_yellow().bold(), e);
                    break;
                }
            }
        }
    }

    let snapshot = collection.snapshot();
    for record in &snapshot.loaded_items {
        println!("{}", serde_json::to_string(record)?);
    }
    print_events(&mut events);

    let total = snapshot.total_count.map_or_else(|| "?".to_string(), |t| t.to_string());
    println!(
        "{} {} {} of {} loaded{}",
        "●".bright_cyan().bold(),
        entity.title().bright_white().bold(),
        snapshot.len().to_string().bright_green().bold(),
        total,
        if snapshot.truncated { " (truncated)".yellow().to_string() } else { String::new() }
    );

    manager.shutdown().await;
    Ok(())
}

fn print_events(events: &mut tokio::sync::mpsc::UnboundedReceiver<ShellEvent>) {
    while let Ok(event) = events.try_recv() {
        eprintln!("{}", event);
    }
}
