use crate::config::Config;
use crate::cpf::Cpf;
use crate::errors::AppError;
use crate::lookup::CpfLookup;
use crate::models::RawUpstreamRecord;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

/// Client for the Work API `modulo=cpf` endpoint.
#[derive(Clone)]
pub struct WorkApiService {
    client: Client,
    base_url: String,
    api_token: String,
}

impl WorkApiService {
    pub fn new(config: &Config) -> Result<Self, AppError> {
        Self::with_base_url(
            config.work_api_base_url.clone(),
            config.work_api_token.clone(),
            config.lookup_timeout,
        )
    }

    /// Creates a client against an explicit base URL.
    pub fn with_base_url(
        base_url: String,
        api_token: String,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            AppError::InternalError(format!("Failed to create Work API client: {}", e))
        })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token,
        })
    }

    /// Fetch the complete CPF record for a document.
    pub async fn fetch_cpf(&self, cpf: &Cpf) -> Result<RawUpstreamRecord, AppError> {
        // Query values are percent-encoded by the URL builder
        let url = reqwest::Url::parse_with_params(
            &format!("{}/api", self.base_url),
            &[
                ("token", self.api_token.as_str()),
                ("modulo", "cpf"),
                ("consulta", cpf.as_str()),
            ],
        )
        .map_err(|e| AppError::InternalError(format!("Failed to build URL: {}", e)))?;

        tracing::info!("Fetching Work API record for CPF: {}", cpf);
        // Token never reaches the logs
        tracing::debug!(
            "Work API URL: {}/api?token=[REDACTED]&modulo=cpf&consulta={}",
            self.base_url,
            cpf
        );

        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::error!("Work API returned error {}: {}", status, error_text);
            return Err(AppError::ExternalApiError(format!(
                "Work API returned status {}: {}",
                status, error_text
            )));
        }

        let record: RawUpstreamRecord = response.json().await.map_err(|e| {
            AppError::ExternalApiError(format!("Failed to parse Work API response: {}", e))
        })?;

        tracing::info!("Successfully fetched Work API record for CPF: {}", cpf);
        Ok(record)
    }
}

#[async_trait]
impl CpfLookup for WorkApiService {
    async fn lookup(&self, cpf: &Cpf) -> Result<RawUpstreamRecord, AppError> {
        self.fetch_cpf(cpf).await
    }
}
