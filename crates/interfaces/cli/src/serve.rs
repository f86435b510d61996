//! `milton serve`: runs the HTTP/WS request gateway and the trigger
//! scheduler in one process, launching the gateway and the background
//! trigger workers from a single daemon entrypoint.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;

use milton_bench::backend::GenerateClient;
use milton_config::AppConfig;
use milton_fetchers::{gather, BriefingFetcher, CalendarFetcher, FinanceFetcher, WeatherFetcher};
use milton_gateway::{router, AppState, RequestGateway};
use milton_jobs::{Job, JobHandler, JobQueueRunner};
use milton_llm::InferenceClient;
use milton_memory::MemoryManager;
use milton_reminders::ReminderScheduler;
use milton_router::AgentRouter;
use milton_scheduler::{Scheduler, TriggerHandler};

pub async fn run(config: AppConfig) -> Result<()> {
    let state_root = config.state_root();
    tokio::fs::create_dir_all(&state_root).await.context("creating state root")?;

    let llm = Arc::new(InferenceClient::new(
        config.llm.base_url.clone(),
        config.llm.model.clone(),
        Duration::from_secs(config.llm.request_timeout_secs),
    ));
    let memory = MemoryManager::open(state_root.join("memory/events.jsonl"), config.memory.clone()).await?;
    let router_client = InferenceClient::new(config.llm.base_url.clone(), config.llm.model.clone(), Duration::from_secs(config.llm.request_timeout_secs));
    let agent_router = Arc::new(AgentRouter::new(router_client));
    let reminders = ReminderScheduler::open(state_root.join("reminders/log.jsonl")).await?;
    let gateway = RequestGateway::new(
        agent_router,
        Arc::clone(&llm),
        Arc::clone(&memory),
        Arc::clone(&reminders),
        state_root.join("dedup/seen.jsonl"),
    )
    .await?;

    let mut handlers: HashMap<String, Arc<dyn TriggerHandler>> = HashMap::new();
    handlers.insert(
        "autobench".to_string(),
        Arc::new(AutobenchHandler { llm: Arc::clone(&llm), model_version: config.llm.model.clone(), state_root: state_root.clone() })
            as Arc<dyn TriggerHandler>,
    );
    handlers.insert(
        "morning_briefing".to_string(),
        Arc::new(MorningBriefingHandler::new(state_root.clone())) as Arc<dyn TriggerHandler>,
    );
    handlers.insert(
        "job_queue".to_string(),
        Arc::new(JobQueueHandler { state_root: state_root.clone() }) as Arc<dyn TriggerHandler>,
    );
    handlers.insert(
        "reminder_tick".to_string(),
        Arc::new(ReminderTickHandler { reminders: Arc::clone(&reminders) }) as Arc<dyn TriggerHandler>,
    );

    let scheduler = Scheduler::new(&config.scheduler, state_root.join("scheduler_state.json"), handlers).await?;
    let _trigger_tasks = scheduler.spawn();

    let bind_addr = config.gateway.bind_addr.clone();
    let app = router(AppState { gateway });
    let listener = tokio::net::TcpListener::bind(&bind_addr).await.context("binding gateway address")?;
    tracing::info!(addr = %bind_addr, "milton gateway listening");
    axum::serve(listener, app).await.context("gateway server exited")?;
    Ok(())
}

struct AutobenchHandler {
    llm: Arc<InferenceClient>,
    model_version: String,
    state_root: std::path::PathBuf,
}

#[async_trait]
impl TriggerHandler for AutobenchHandler {
    async fn fire(&self) -> Result<()> {
        let candidate = milton_bench::runner::Candidate { model_version: self.model_version.clone(), client: self.llm.as_ref() as &dyn GenerateClient };
        let run = milton_bench::runner::run_all(&[candidate]).await;
        let path = milton_bench::runner::write_run(&self.state_root, &run).await?;
        tracing::info!(path = %path.display(), "autobench run written");
        Ok(())
    }
}

struct MorningBriefingHandler {
    fetchers: Vec<Arc<dyn BriefingFetcher>>,
    state_root: std::path::PathBuf,
}

impl MorningBriefingHandler {
    fn new(state_root: std::path::PathBuf) -> Self {
        let fetchers: Vec<Arc<dyn BriefingFetcher>> = vec![
            Arc::new(WeatherFetcher::new(37.7749, -122.4194)),
            Arc::new(CalendarFetcher::new(
                std::env::var("MILTON_CALENDAR_URL").unwrap_or_else(|_| "https://calendar.example.invalid".to_string()),
                None,
            )),
            Arc::new(FinanceFetcher::new(
                std::env::var("MILTON_FINANCE_URL").unwrap_or_else(|_| "https://finance.example.invalid".to_string()),
                None,
            )),
        ];
        Self { fetchers, state_root }
    }
}

#[async_trait]
impl TriggerHandler for MorningBriefingHandler {
    async fn fire(&self) -> Result<()> {
        let results = gather(&self.fetchers).await;
        let dir = self.state_root.join("briefings");
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(format!("{}.json", Utc::now().format("%Y%m%d_%H%M%S")));
        tokio::fs::write(&path, serde_json::to_vec_pretty(&results)?).await?;
        tracing::info!(path = %path.display(), "morning briefing written");
        Ok(())
    }
}

struct JobQueueHandler {
    state_root: std::path::PathBuf,
}

struct PassthroughHandler;

#[async_trait]
impl JobHandler for PassthroughHandler {
    async fn run(&self, job: &Job, output_dir: &Path) -> Result<Vec<String>> {
        let path = output_dir.join("payload.json");
        tokio::fs::write(&path, serde_json::to_vec_pretty(&job.payload)?).await?;
        Ok(vec!["payload.json".to_string()])
    }
}

#[async_trait]
impl TriggerHandler for JobQueueHandler {
    async fn fire(&self) -> Result<()> {
        let runner = JobQueueRunner::new(self.state_root.join("job_queue"), self.state_root.join("outputs"), None);
        let records = runner.run_pending(&PassthroughHandler).await?;
        tracing::info!(count = records.len(), "job queue drained");
        Ok(())
    }
}

struct ReminderTickHandler {
    reminders: Arc<ReminderScheduler>,
}

#[async_trait]
impl TriggerHandler for ReminderTickHandler {
    async fn fire(&self) -> Result<()> {
        let due = self.reminders.tick(Utc::now().timestamp()).await?;
        for reminder in due {
            tracing::info!(task = %reminder.task, owner = %reminder.owner, "reminder due");
        }
        Ok(())
    }
}
