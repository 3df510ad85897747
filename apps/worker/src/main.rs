//! Registra sync worker runtime.

#![forbid(unsafe_code)]

use std::env;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use registra_application::{
    AuditBackfillCache, BroadcastDispatcher, EventLog, InvalidationNotifier, SyncEntityConfig,
    SyncService,
};
use registra_core::{AppError, AppResult};
use registra_domain::SyncedEntityKind;
use registra_infrastructure::{
    HttpAuditSource, HttpChangeFeed, PostgresSyncStore, RedisInvalidationChannel,
};

#[derive(Debug, Clone)]
struct WorkerConfig {
    database_url: String,
    crm_api_base_url: String,
    crm_api_key: Option<String>,
    redis_url: Option<String>,
    entities: Vec<SyncedEntityKind>,
    page_size: usize,
    roll_up_changes: bool,
    modified_since: Option<DateTime<Utc>>,
    poll_interval_ms: u64,
    retry_base_seconds: u64,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = WorkerConfig::load()?;
    let pool = connect_pool(config.database_url.as_str()).await?;

    let store = Arc::new(PostgresSyncStore::new(pool));
    let feed = Arc::new(HttpChangeFeed::new(
        config.crm_api_base_url.clone(),
        config.crm_api_key.clone(),
    )?);
    let audit = Arc::new(HttpAuditSource::new(
        config.crm_api_base_url.clone(),
        config.crm_api_key.clone(),
    )?);

    let mut dispatcher = BroadcastDispatcher::new();
    match &config.redis_url {
        Some(redis_url) => {
            let client = redis::Client::open(redis_url.as_str()).map_err(|error| {
                AppError::Internal(format!("failed to open redis client: {error}"))
            })?;
            let channel = Arc::new(RedisInvalidationChannel::new(client));
            dispatcher.register(Arc::new(InvalidationNotifier::new(channel)));
            info!("cross-process invalidation enabled");
        }
        None => {
            info!("REDIS_URL not configured; cross-process invalidation disabled");
        }
    }
    let event_log = EventLog::new(Arc::new(dispatcher));

    let (shutdown_sender, shutdown) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            let _ = shutdown_sender.send(true);
        }
    });

    info!(
        crm_api_base_url = config.crm_api_base_url.as_str(),
        page_size = config.page_size,
        roll_up_changes = config.roll_up_changes,
        poll_interval_ms = config.poll_interval_ms,
        "registra-worker started"
    );

    let mut partitions = Vec::new();
    for kind in config.entities.clone() {
        // One backfill cache per partition keeps worker lifetimes isolated.
        let service = SyncService::new(
            store.clone(),
            feed.clone(),
            Arc::new(AuditBackfillCache::new(audit.clone())),
            event_log.clone(),
        );
        let entity_config = entity_config(&config, kind);
        let partition_config = config.clone();
        let cancel = shutdown.clone();

        partitions.push(tokio::spawn(async move {
            run_partition(service, entity_config, partition_config, cancel).await;
        }));
    }

    for partition in partitions {
        if let Err(error) = partition.await {
            error!(error = %error, "sync partition task ended abnormally");
        }
    }

    Ok(())
}

/// Drives one entity type's sync loop until shutdown.
///
/// Retry policy lives here, outside the sync core: transient feed outages
/// back off exponentially and resume from the persisted watermark, while a
/// duplicate event id halts only this partition and waits for an operator.
async fn run_partition(
    service: SyncService,
    entity_config: SyncEntityConfig,
    config: WorkerConfig,
    mut cancel: watch::Receiver<bool>,
) {
    let changes_key = entity_config.changes_key.clone();
    let mut failed_attempts: u32 = 0;

    loop {
        if *cancel.borrow() {
            info!(changes_key = changes_key.as_str(), "sync partition stopped");
            return;
        }

        match service.run(&entity_config, cancel.clone()).await {
            Ok(()) => {
                failed_attempts = 0;
                if wait_or_cancel(
                    &mut cancel,
                    Duration::from_millis(config.poll_interval_ms),
                )
                .await
                {
                    info!(changes_key = changes_key.as_str(), "sync partition stopped");
                    return;
                }
            }
            Err(AppError::FeedUnavailable(reason)) => {
                failed_attempts = failed_attempts.saturating_add(1);
                let backoff = backoff_delay(config.retry_base_seconds, failed_attempts);
                warn!(
                    changes_key = changes_key.as_str(),
                    reason,
                    failed_attempts,
                    backoff_seconds = backoff.as_secs(),
                    "change feed unavailable; resuming from the watermark after backoff"
                );
                if wait_or_cancel(&mut cancel, backoff).await {
                    return;
                }
            }
            Err(AppError::DuplicateEvent(reason)) => {
                error!(
                    changes_key = changes_key.as_str(),
                    reason,
                    "duplicate event id; halting this partition for operator intervention"
                );
                return;
            }
            Err(other) => {
                failed_attempts = failed_attempts.saturating_add(1);
                let backoff = backoff_delay(config.retry_base_seconds, failed_attempts);
                error!(
                    changes_key = changes_key.as_str(),
                    error = %other,
                    failed_attempts,
                    backoff_seconds = backoff.as_secs(),
                    "sync pass failed; retrying after backoff"
                );
                if wait_or_cancel(&mut cancel, backoff).await {
                    return;
                }
            }
        }
    }
}

fn entity_config(config: &WorkerConfig, kind: SyncedEntityKind) -> SyncEntityConfig {
    let mut entity_config = SyncEntityConfig::new(kind);
    entity_config.page_size = config.page_size;
    entity_config.roll_up_changes = config.roll_up_changes;
    entity_config.modified_since = config.modified_since;
    entity_config
}

fn backoff_delay(base_seconds: u64, attempt: u32) -> Duration {
    let capped_step = attempt.min(10);
    let seconds = base_seconds
        .saturating_mul(2_u64.saturating_pow(capped_step))
        .min(1800);
    Duration::from_secs(seconds)
}

/// Sleeps for the given delay; returns true when shutdown arrived first.
async fn wait_or_cancel(cancel: &mut watch::Receiver<bool>, delay: Duration) -> bool {
    tokio::select! {
        () = tokio::time::sleep(delay) => false,
        changed = cancel.changed() => changed.is_err() || *cancel.borrow(),
    }
}

async fn connect_pool(database_url: &str) -> AppResult<PgPool> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .map_err(|error| AppError::Internal(format!("failed to connect to database: {error}")))
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

impl WorkerConfig {
    fn load() -> AppResult<Self> {
        let database_url = required_env("DATABASE_URL")?;
        let crm_api_base_url = required_env("CRM_API_BASE_URL")?
            .trim_end_matches('/')
            .to_owned();
        let crm_api_key = optional_env("CRM_API_KEY");
        let redis_url = optional_env("REDIS_URL");
        let entities = parse_env_entities("SYNC_ENTITIES")?;
        let page_size = parse_env_usize("SYNC_PAGE_SIZE", 1000)?;
        let roll_up_changes = parse_env_bool("SYNC_ROLL_UP_CHANGES", true)?;
        let modified_since = parse_env_instant("SYNC_MODIFIED_SINCE")?;
        let poll_interval_ms = parse_env_u64("SYNC_POLL_INTERVAL_MS", 5000)?;
        let retry_base_seconds = parse_env_u64("SYNC_RETRY_BASE_SECONDS", 2)?;

        if page_size == 0 {
            return Err(AppError::Validation(
                "SYNC_PAGE_SIZE must be greater than zero".to_owned(),
            ));
        }

        if poll_interval_ms == 0 {
            return Err(AppError::Validation(
                "SYNC_POLL_INTERVAL_MS must be greater than zero".to_owned(),
            ));
        }

        if retry_base_seconds == 0 {
            return Err(AppError::Validation(
                "SYNC_RETRY_BASE_SECONDS must be greater than zero".to_owned(),
            ));
        }

        Ok(Self {
            database_url,
            crm_api_base_url,
            crm_api_key,
            redis_url,
            entities,
            page_size,
            roll_up_changes,
            modified_since,
            poll_interval_ms,
            retry_base_seconds,
        })
    }
}

fn required_env(name: &str) -> AppResult<String> {
    env::var(name).map_err(|_| AppError::Validation(format!("{name} is required")))
}

fn optional_env(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn parse_env_usize(name: &str, default: usize) -> AppResult<usize> {
    match env::var(name) {
        Ok(value) => value.parse::<usize>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}

fn parse_env_u64(name: &str, default: u64) -> AppResult<u64> {
    match env::var(name) {
        Ok(value) => value.parse::<u64>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}

fn parse_env_bool(name: &str, default: bool) -> AppResult<bool> {
    match env::var(name) {
        Ok(value) => value.parse::<bool>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}

fn parse_env_entities(name: &str) -> AppResult<Vec<SyncedEntityKind>> {
    let raw = env::var(name).unwrap_or_else(|_| "contact,professionalstatus".to_owned());

    let mut kinds = Vec::new();
    for entry in raw.split(',') {
        let trimmed = entry.trim();
        if trimmed.is_empty() {
            continue;
        }

        let kind = SyncedEntityKind::from_logical_name(trimmed).ok_or_else(|| {
            AppError::Validation(format!("invalid {name} entry '{trimmed}'"))
        })?;
        if !kinds.contains(&kind) {
            kinds.push(kind);
        }
    }

    if kinds.is_empty() {
        return Err(AppError::Validation(format!(
            "{name} must name at least one entity type"
        )));
    }

    Ok(kinds)
}

fn parse_env_instant(name: &str) -> AppResult<Option<DateTime<Utc>>> {
    match env::var(name) {
        Ok(value) => DateTime::parse_from_rfc3339(value.as_str())
            .map(|instant| Some(instant.with_timezone(&Utc)))
            .map_err(|error| {
                AppError::Validation(format!("invalid {name} value '{value}': {error}"))
            }),
        Err(_) => Ok(None),
    }
}
