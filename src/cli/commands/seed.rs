use anyhow::{Context, Result};
use clap::Args;
use colored::*;
use rand::Rng;
use rand::seq::IndexedRandom;
use serde_json::json;

use fleet_coordinator::api::{CrudGateway, EntityType, SqliteGateway};
use fleet_coordinator::config::Config;

const FIRST_NAMES: &[&str] = &["Ada", "Grace", "Linus", "Margaret", "Dennis", "Barbara", "Ken", "Frances"];
const LAST_NAMES: &[&str] = &["Lovelace", "Hopper", "Torvalds", "Hamilton", "Ritchie", "Liskov", "Thompson", "Allen"];
const MODELS: &[&str] = &["Transit", "Sprinter", "Vito", "Master", "Ducato"];
const PLACES: &[&str] = &["Harbour", "Airport", "North Depot", "Old Town", "Ring Road", "Market"];

#[derive(Args)]
pub struct SeedArgs {
    /// Number of drivers to create
    #[arg(long, default_value_t = 25)]
    pub drivers: usize,
    /// Number of vehicles to create
    #[arg(long, default_value_t = 20)]
    pub vehicles: usize,
    /// Number of routes to create
    #[arg(long, default_value_t = 120)]
    pub routes: usize,
}

pub async fn seed_command(args: SeedArgs, config: &Config) -> Result<()> {
    let database = config.database_path()?;
    let gateway = SqliteGateway::connect(&database).await?;
    let mut rng = rand::rng();

    println!("🌱 Seeding {}", database.display().to_string().cyan());

    let mut driver_ids = Vec::with_capacity(args.drivers);
    for n in 1..=args.drivers {
        let first = FIRST_NAMES.choose(&mut rng).copied().unwrap_or("Driver");
        let last = LAST_NAMES.choose(&mut rng).copied().unwrap_or("Unknown");
        let record = gateway
            .create(
                EntityType::Drivers,
                &json!({"full_name": format!("{first} {last}"), "license_number": format!("DL-{:05}", n)}),
            )
            .await
            .context("Failed to create driver")?;
        driver_ids.push(record.id);
    }

    let mut vehicle_ids = Vec::with_capacity(args.vehicles);
    for n in 1..=args.vehicles {
        let model = MODELS.choose(&mut rng).copied().unwrap_or("Van");
        let record = gateway
            .create(
                EntityType::Vehicles,
                &json!({"plate_number": format!("FL-{:04}", n), "model": model}),
            )
            .await
            .context("Failed to create vehicle")?;
        vehicle_ids.push(record.id);
    }

    let mut routes = 0;
    if !driver_ids.is_empty() && !vehicle_ids.is_empty() {
        for n in 1..=args.routes {
            let from = PLACES.choose(&mut rng).copied().unwrap_or("Depot");
            let to = PLACES.choose(&mut rng).copied().unwrap_or("Depot");
            let driver_id = driver_ids[rng.random_range(0..driver_ids.len())];
            let vehicle_id = vehicle_ids[rng.random_range(0..vehicle_ids.len())];
            gateway
                .create(
                    EntityType::Routes,
                    &json!({
                        "name": format!("R{n:03} {from} - {to}"),
                        "driver_id": driver_id,
                        "vehicle_id": vehicle_id,
                    }),
                )
                .await
                .context("Failed to create route")?;
            routes += 1;
        }
    } else if args.routes > 0 {
        println!("  {} Routes need at least one driver and one vehicle; skipped", "⚠️".bright_yellow().bold());
    }

    println!(
        "{} Created {} drivers, {} vehicles and {} routes",
        "✓".bright_green().bold(),
        driver_ids.len().to_string().bright_green().bold(),
        vehicle_ids.len().to_string().bright_green().bold(),
        routes.to_string().bright_green().bold()
    );
    Ok(())
}
