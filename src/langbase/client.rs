use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::types::{CreatePipeRequest, CreatePipeResponse, PipeRequest, PipeResponse, PipeTemplate};
use crate::config::{LangbaseConfig, RequestConfig};
use crate::error::{LangbaseError, LangbaseResult};

/// Client for interacting with Langbase Pipes API
#[derive(Clone)]
pub struct LangbaseClient {
    client: Client,
    base_url: String,
    api_key: String,
    request_config: RequestConfig,
}

impl LangbaseClient {
    /// Create a new Langbase client
    pub fn new(config: &LangbaseConfig, request_config: RequestConfig) -> LangbaseResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(LangbaseError::Http)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            request_config,
        })
    }

    /// Run a pipe, retrying with exponential backoff.
    ///
    /// 4xx responses other than 429 are not retried.
    pub async fn call_pipe(&self, request: PipeRequest) -> LangbaseResult<PipeResponse> {
        let url = format!("{}/v1/pipes/run", self.base_url);
        let pipe_name = request.name.clone();

        let mut last_error = None;
        let mut attempt = 0;

        while attempt <= self.request_config.max_retries {
            if attempt > 0 {
                let delay = Duration::from_millis(
                    self.request_config.retry_delay_ms * (2_u64.pow(attempt - 1)),
                );
                warn!(
                    pipe = %pipe_name,
                    retry = attempt,
                    delay_ms = delay.as_millis(),
                    "Retrying Langbase request"
                );
                tokio::time::sleep(delay).await;
            }

            let start = Instant::now();

            match self.execute_request(&url, &request).await {
                Ok(response) => {
                    info!(
                        pipe = %pipe_name,
                        latency_ms = start.elapsed().as_millis(),
                        "Langbase pipe call succeeded"
                    );
                    return Ok(response);
                }
                Err(LangbaseError::Api { status, message })
                    if (400..500).contains(&status) && status != 429 =>
                {
                    error!(pipe = %pipe_name, status, "Langbase rejected request");
                    return Err(LangbaseError::Api { status, message });
                }
                Err(e) => {
                    error!(
                        pipe = %pipe_name,
                        error = %e,
                        latency_ms = start.elapsed().as_millis(),
                        retry = attempt,
                        "Langbase pipe call failed"
                    );
                    last_error = Some(e);
                    attempt += 1;
                }
            }
        }

        Err(LangbaseError::Unavailable {
            message: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string()),
            retries: attempt.saturating_sub(1),
        })
    }

    async fn execute_request(
        &self,
        url: &str,
        request: &PipeRequest,
    ) -> LangbaseResult<PipeResponse> {
        debug!(
            pipe = %request.name,
            messages = request.messages.len(),
            "Calling Langbase pipe"
        );

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LangbaseError::Timeout {
                        timeout_ms: self.request_config.timeout_ms,
                    }
                } else {
                    LangbaseError::Http(e)
                }
            })?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(LangbaseError::Api {
                status: status.as_u16(),
                message: error_body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| LangbaseError::InvalidResponse {
                message: format!("Failed to parse response: {}", e),
            })
    }

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Create a new pipe
    pub async fn create_pipe(
        &self,
        request: CreatePipeRequest,
    ) -> LangbaseResult<CreatePipeResponse> {
        let url = format!("{}/v1/pipes", self.base_url);

        info!(pipe = %request.name, "Creating Langbase pipe");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(LangbaseError::Http)?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(LangbaseError::Api {
                status: status.as_u16(),
                message: error_body,
            });
        }

        let created: CreatePipeResponse =
            response
                .json()
                .await
                .map_err(|e| LangbaseError::InvalidResponse {
                    message: format!("Failed to parse create pipe response: {}", e),
                })?;

        info!(pipe = %created.name, url = %created.url, "Pipe created");

        Ok(created)
    }

    /// Make sure a pipe built from `template` exists under `name`.
    ///
    /// A 409 from Langbase means the pipe is already there.
    pub async fn ensure_pipe(
        &self,
        name: &str,
        template: &PipeTemplate,
        model: &str,
    ) -> LangbaseResult<()> {
        match self.create_pipe(template.to_request(name, model)).await {
            Ok(_) => {
                info!(pipe = %name, "Pipe ready");
                Ok(())
            }
            Err(LangbaseError::Api { status: 409, .. }) => {
                info!(pipe = %name, "Pipe already exists");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
