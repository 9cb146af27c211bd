use celestia_infra::PipelineConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    celestia_observability::init();

    let config = PipelineConfig::from_env()?;
    for warning in config.warnings() {
        tracing::warn!("{warning}");
    }

    let app = celestia_worker::app::build(&config).await?;
    let tasks = app.spawn(&config);
    tracing::info!(tasks = tasks.len(), "worker started");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested");

    for task in tasks {
        let name = task.name();
        let stats = task.stats();
        task.shutdown().await;
        tracing::info!(task = name, ticks = stats.ticks, errors = stats.errors, "task stopped");
    }
    Ok(())
}
