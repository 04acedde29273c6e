use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crewboard_backend::jobs::JobScheduler;
use crewboard_backend::{database, Automation, Config, PgStore, RecordStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    let db_pool = database::connect(&config.database_url, &config.pool).await?;

    database::migrate(&db_pool).await?;
    if !database::health_check(&db_pool).await {
        anyhow::bail!("Record store is not reachable");
    }

    let store: Arc<dyn RecordStore> = Arc::new(PgStore::new(db_pool));
    let automation = Arc::new(Automation::new(store, &config.automation));

    let installed = automation.install_presets().await;
    tracing::info!(
        installed,
        escalation_rules = config.automation.escalation_rules.len(),
        "Automation core ready"
    );

    let mut scheduler = JobScheduler::new(automation, config.jobs.clone()).await?;
    scheduler.start().await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    scheduler.shutdown().await?;
    Ok(())
}
