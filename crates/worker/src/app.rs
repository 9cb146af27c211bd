//! Wiring: config -> stores, collaborators and periodic tasks.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::info;

use celestia_ai::{GeminiClient, ImageGenerator, MockGenerator, TextGenerator};
use celestia_core::{SharedClock, SystemClock};
use celestia_infra::cache::ReadingService;
use celestia_infra::db;
use celestia_infra::jobs::GenerationPoller;
use celestia_infra::notifications::{LogNotifier, NotificationDispatcher, Notifier, WebhookNotifier};
use celestia_infra::scheduler::{TaskHandle, spawn_periodic};
use celestia_infra::storage::FilesystemStorage;
use celestia_infra::worker::GenerationWorker;
use celestia_infra::{Pipeline, PipelineConfig, Stores};

const POOL_SIZE: u32 = 5;
const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything the process runs.
pub struct App {
    pub pipeline: Arc<Pipeline>,
    pub poller: Arc<GenerationPoller>,
    pub dispatcher: Arc<NotificationDispatcher>,
}

impl App {
    /// Start the poller and the notification sweep.
    pub fn spawn(&self, config: &PipelineConfig) -> Vec<TaskHandle> {
        vec![
            spawn_periodic(self.poller.clone(), config.job_schedule()),
            spawn_periodic(self.dispatcher.clone(), config.notify_schedule()),
        ]
    }
}

pub async fn build(config: &PipelineConfig) -> anyhow::Result<App> {
    build_with_clock(config, Arc::new(SystemClock)).await
}

pub async fn build_with_clock(config: &PipelineConfig, clock: SharedClock) -> anyhow::Result<App> {
    let stores = match &config.database_url {
        Some(url) => {
            let pool = db::connect(url, POOL_SIZE)
                .await
                .context("failed to connect to the database")?;
            db::ensure_schema(&pool).await.context("failed to apply schema")?;
            info!("using postgres stores");
            Stores::postgres(pool)
        }
        None => {
            info!("DATABASE_URL not set; using in-memory stores");
            Stores::in_memory()
        }
    };

    let (text, image): (Arc<dyn TextGenerator>, Arc<dyn ImageGenerator>) = match config.gemini() {
        Some(gemini) => {
            info!(text_model = %gemini.text_model, image_model = %gemini.image_model, "using gemini");
            let client = Arc::new(GeminiClient::new(gemini).context("failed to build gemini client")?);
            let text: Arc<dyn TextGenerator> = client.clone();
            let image: Arc<dyn ImageGenerator> = client;
            (text, image)
        }
        None => {
            info!("using mock generator");
            let mock = Arc::new(MockGenerator::new());
            let text: Arc<dyn TextGenerator> = mock.clone();
            let image: Arc<dyn ImageGenerator> = mock;
            (text, image)
        }
    };

    let readings = Arc::new(ReadingService::new(
        stores.readings.clone(),
        text.clone(),
        clock.clone(),
        config.generation_timeout,
    ));

    let mut worker = GenerationWorker::new(
        text,
        image,
        stores.artifacts.clone(),
        clock.clone(),
        config.worker_settings(),
    )
    .with_readings(readings.clone());
    if let Some(dir) = &config.storage_dir {
        let public_url = config
            .storage_public_url
            .clone()
            .unwrap_or_else(|| format!("file://{}", dir.display()));
        worker = worker.with_storage(Arc::new(FilesystemStorage::new(dir.clone(), public_url)));
    }

    let notifier: Arc<dyn Notifier> = match &config.notify_webhook_url {
        Some(url) => Arc::new(
            WebhookNotifier::new(url.clone(), WEBHOOK_TIMEOUT)
                .context("failed to build webhook notifier")?,
        ),
        None => Arc::new(LogNotifier),
    };

    let pipeline = Arc::new(Pipeline::new(&stores, readings, clock.clone()));
    let poller = Arc::new(GenerationPoller::new(pipeline.queue().clone(), Arc::new(worker)));
    let dispatcher = Arc::new(NotificationDispatcher::new(
        stores.artifacts.clone(),
        notifier,
        clock,
        config.notify_batch_size,
    ));

    Ok(App {
        pipeline,
        poller,
        dispatcher,
    })
}
