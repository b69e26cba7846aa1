//! Application state wiring the engine together.
//!
//! The engine components are generic over repository and sender traits;
//! AppState pins them to the SQLite repositories and the Resend/Twilio
//! senders. Shared by CLI commands, HTTP handlers and the background
//! scheduler loop.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use leadflow_core::workflow::enrollment::EnrollmentManager;
use leadflow_core::workflow::runner::WorkflowRunner;
use leadflow_core::workflow::scheduler::Scheduler;
use leadflow_core::workflow::step_runner::StepRunner;
use leadflow_infra::config::{AppConfig, ProviderCredentials};
use leadflow_infra::delivery::{ResendEmailSender, TwilioSmsSender};
use leadflow_infra::sqlite::crm::SqliteCrmRepository;
use leadflow_infra::sqlite::enrollment::SqliteEnrollmentRepository;
use leadflow_infra::sqlite::pool::{DatabasePool, default_database_url};
use leadflow_infra::sqlite::workflow::SqliteWorkflowRepository;

/// Concrete type aliases for the engine generics pinned to infra implementations.
pub type ConcreteManager = EnrollmentManager<
    SqliteEnrollmentRepository,
    SqliteCrmRepository,
    ResendEmailSender,
    TwilioSmsSender,
>;

pub type ConcreteRunner = WorkflowRunner<
    SqliteWorkflowRepository,
    SqliteEnrollmentRepository,
    SqliteCrmRepository,
    ResendEmailSender,
    TwilioSmsSender,
>;

pub type ConcreteScheduler = Scheduler<
    SqliteWorkflowRepository,
    SqliteEnrollmentRepository,
    SqliteCrmRepository,
    ResendEmailSender,
    TwilioSmsSender,
>;

#[derive(Clone)]
pub struct AppState {
    pub runner: Arc<ConcreteRunner>,
    pub scheduler: Arc<ConcreteScheduler>,
    pub workflows: Arc<SqliteWorkflowRepository>,
    pub enrollments: Arc<SqliteEnrollmentRepository>,
    pub crm: Arc<SqliteCrmRepository>,
    pub config: Arc<AppConfig>,
    pub data_dir: PathBuf,
}

impl AppState {
    /// Open the database, read provider credentials from the environment and
    /// wire the engine.
    pub async fn init(config: AppConfig, data_dir: PathBuf) -> anyhow::Result<Self> {
        tokio::fs::create_dir_all(&data_dir)
            .await
            .with_context(|| format!("failed to create data dir {}", data_dir.display()))?;

        let db_url = config
            .database
            .url
            .clone()
            .unwrap_or_else(|| format!("{}?mode=rwc", default_database_url(&data_dir)));
        let pool = DatabasePool::new(&db_url)
            .await
            .with_context(|| format!("failed to open database {db_url}"))?;

        let (resend_key, twilio) = ProviderCredentials::from_env().into_parts();
        let timeout = Duration::from_secs(config.delivery.timeout_secs);

        let mut email = ResendEmailSender::new(resend_key, timeout)?;
        if let Some(url) = &config.delivery.resend_base_url {
            email = email.with_base_url(url.as_str());
        }
        let mut sms = TwilioSmsSender::new(twilio, timeout)?;
        if let Some(url) = &config.delivery.twilio_base_url {
            sms = sms.with_base_url(url.as_str());
        }
        if !email.is_configured() {
            tracing::warn!("RESEND_API_KEY not set; email steps will fail outside test mode");
        }
        if !sms.is_configured() {
            tracing::warn!("Twilio credentials not set; SMS steps will fail outside test mode");
        }

        Ok(Self::wire(pool, config, data_dir, email, sms))
    }

    /// Build the component graph over an open pool and ready senders.
    pub fn wire(
        pool: DatabasePool,
        config: AppConfig,
        data_dir: PathBuf,
        email: ResendEmailSender,
        sms: TwilioSmsSender,
    ) -> Self {
        let workflows = Arc::new(SqliteWorkflowRepository::new(pool.clone()));
        let enrollments = Arc::new(SqliteEnrollmentRepository::new(pool.clone()));
        let crm = Arc::new(SqliteCrmRepository::new(pool));

        let steps = StepRunner::new(
            Arc::clone(&crm),
            Arc::new(email),
            Arc::new(sms),
            config.engine.clone(),
        );
        let manager = Arc::new(EnrollmentManager::new(Arc::clone(&enrollments), steps));
        let runner = WorkflowRunner::new(
            Arc::clone(&workflows),
            Arc::clone(&crm),
            Arc::clone(&manager),
            config.engine.clone(),
        );
        let scheduler = Scheduler::new(
            Arc::clone(&workflows),
            Arc::clone(&enrollments),
            Arc::clone(&crm),
            manager,
            config.scheduler.batch_size,
        );

        Self {
            runner: Arc::new(runner),
            scheduler: Arc::new(scheduler),
            workflows,
            enrollments,
            crm,
            config: Arc::new(config),
            data_dir,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// State over a temp database with unconfigured providers.
    pub async fn test_state() -> AppState {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("test.db").display());
        let pool = DatabasePool::new(&url).await.unwrap();
        let data_dir = dir.path().to_path_buf();
        std::mem::forget(dir);

        let timeout = Duration::from_secs(5);
        AppState::wire(
            pool,
            AppConfig::default(),
            data_dir,
            ResendEmailSender::new(None, timeout).unwrap(),
            TwilioSmsSender::new(None, timeout).unwrap(),
        )
    }
}
