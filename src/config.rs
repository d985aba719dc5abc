use std::time::Duration;

/// Default Work API host.
pub const DEFAULT_WORK_API_BASE_URL: &str = "https://completa.workbuscas.com";

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub work_api_token: String,
    pub work_api_base_url: String,
    /// When set, registered entries live in Postgres; otherwise in `cpf_store_path`.
    pub database_url: Option<String>,
    pub cpf_store_path: String,
    pub batch_item_delay: Duration,
    pub lookup_timeout: Duration,
    pub lookup_max_retries: u32,
    pub batch_queue_capacity: usize,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            work_api_token: std::env::var("WORK_API_TOKEN")
                .or_else(|_| std::env::var("WORK_API"))
                .map_err(|_| {
                    anyhow::anyhow!("WORK_API_TOKEN or WORK_API environment variable required")
                })
                .and_then(|token| {
                    if token.trim().is_empty() {
                        anyhow::bail!("WORK_API_TOKEN cannot be empty");
                    }
                    Ok(token)
                })?,
            work_api_base_url: validate_http_url(
                std::env::var("WORK_API_BASE_URL")
                    .ok()
                    .filter(|s| !s.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_WORK_API_BASE_URL.to_string()),
            )?,
            database_url: std::env::var("DATABASE_URL")
                .or_else(|_| std::env::var("DB_URL"))
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(|url| {
                    if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                        anyhow::bail!("DATABASE_URL must start with postgresql:// or postgres://");
                    }
                    Ok(url)
                })
                .transpose()?,
            cpf_store_path: std::env::var("CPF_STORE_PATH")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| "cpf_data.json".to_string()),
            batch_item_delay: Duration::from_millis(parse_env("BATCH_ITEM_DELAY_MS", 500)?),
            lookup_timeout: Duration::from_secs(parse_env("LOOKUP_TIMEOUT_SECS", 30)?),
            lookup_max_retries: parse_env("LOOKUP_MAX_RETRIES", 0)?,
            batch_queue_capacity: parse_env("BATCH_QUEUE_CAPACITY", 32)?,
        };

        if config.lookup_timeout.is_zero() {
            anyhow::bail!("LOOKUP_TIMEOUT_SECS must be greater than zero");
        }
        if config.batch_queue_capacity == 0 {
            anyhow::bail!("BATCH_QUEUE_CAPACITY must be greater than zero");
        }

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!("Work API Base URL: {}", config.work_api_base_url);
        match config.database_url {
            Some(ref url) => tracing::debug!("Database URL: {}...", &url[..20.min(url.len())]),
            None => tracing::info!(
                "DATABASE_URL not set, registered entries stored in {}",
                config.cpf_store_path
            ),
        }
        tracing::debug!(
            "Batch delay: {:?}, lookup timeout: {:?}, max retries: {}",
            config.batch_item_delay,
            config.lookup_timeout,
            config.lookup_max_retries
        );
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }
}

/// Reads a numeric variable, falling back to `default` when unset.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> anyhow::Result<T> {
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{} must be a valid non-negative number", key)),
        _ => Ok(default),
    }
}

fn validate_http_url(raw: String) -> anyhow::Result<String> {
    let parsed = url::Url::parse(&raw)
        .map_err(|e| anyhow::anyhow!("WORK_API_BASE_URL is not a valid URL: {}", e))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        anyhow::bail!("WORK_API_BASE_URL must start with http:// or https://");
    }
    Ok(raw)
}
