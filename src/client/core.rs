use crate::client::builder::CatalogClientBuilder;
use crate::client::error_classification::{classify, RawFailure};
use crate::client::validation::{validate_body, ResponseShape};
use crate::error_code::{ApiResult, ErrorRecord};
use crate::resilience::fault_injector::FaultInjector;
use crate::resilience::retry::{Decision, RetryProfile};
use crate::transport::HttpTransport;
use crate::Result;
use reqwest::Method;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Outcome of one attempt that did not succeed.
struct AttemptFailure {
    record: ErrorRecord,
    /// Synthesized by the fault injector; no I/O happened.
    injected: bool,
}

/// Resilient gateway to the catalog REST API.
///
/// Each call consults the fault injector once per attempt, classifies every
/// failure into an [`ErrorRecord`], validates the payload shape and retries
/// retryable real failures with the transport profile.
pub struct CatalogClient {
    transport: HttpTransport,
    faults: Arc<FaultInjector>,
    retry: RetryProfile,
}

impl CatalogClient {
    /// Client configured from the environment with its own fault injector.
    pub fn new() -> Result<Self> {
        CatalogClientBuilder::new().build()
    }

    pub fn builder() -> CatalogClientBuilder {
        CatalogClientBuilder::new()
    }

    pub(crate) fn from_parts(
        transport: HttpTransport,
        faults: Arc<FaultInjector>,
        retry: RetryProfile,
    ) -> Self {
        Self {
            transport,
            faults,
            retry,
        }
    }

    pub fn fault_injector(&self) -> &Arc<FaultInjector> {
        &self.faults
    }

    pub fn retry_profile(&self) -> &RetryProfile {
        &self.retry
    }

    pub fn base_url(&self) -> &str {
        self.transport.base_url()
    }

    async fn attempt<T: ResponseShape>(
        &self,
        method: &Method,
        path: &str,
        body: Option<&serde_json::Value>,
        request_id: &str,
    ) -> std::result::Result<T, AttemptFailure> {
        if let Some(fault) = self.faults.consume() {
            return Err(AttemptFailure {
                record: classify(&fault.raw_failure()),
                injected: true,
            });
        }

        let real = |f: RawFailure| AttemptFailure {
            record: classify(&f),
            injected: false,
        };
        let raw = self
            .transport
            .send(method.clone(), path, body, request_id)
            .await
            .map_err(real)?;
        validate_body::<T>(&raw).map_err(|f| {
            debug!(shape = T::SHAPE, failure = ?f, "response failed shape validation");
            real(f)
        })
    }

    /// Issue a request and decode the response as `T`.
    ///
    /// Injected faults are returned to the caller immediately; real retryable
    /// failures are retried here before the final record is surfaced.
    pub async fn request<T: ResponseShape>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> ApiResult<T> {
        let request_id = Uuid::new_v4().to_string();
        let mut attempt: u32 = 0;

        loop {
            let start = Instant::now();
            let failure = match self
                .attempt::<T>(&method, path, body.as_ref(), &request_id)
                .await
            {
                Ok(v) => {
                    debug!(
                        method = %method,
                        path,
                        attempt,
                        request_id = request_id.as_str(),
                        duration_ms = start.elapsed().as_millis() as u64,
                        "catalog request succeeded"
                    );
                    return Ok(v);
                }
                Err(f) => f,
            };

            let record = failure.record;
            if failure.injected {
                info!(
                    method = %method,
                    path,
                    kind = record.code(),
                    request_id = request_id.as_str(),
                    "simulated failure returned"
                );
                return Err(record);
            }

            match self.retry.decide(&record, attempt) {
                Decision::Retry { delay } => {
                    info!(
                        method = %method,
                        path,
                        attempt = attempt + 1,
                        max_retries = self.retry.max_retries,
                        kind = record.code(),
                        http_status = record.http_status,
                        delay_ms = delay.as_millis() as u64,
                        "transport retry scheduled"
                    );
                    tokio::time::sleep(delay).await;
                    attempt = attempt.saturating_add(1);
                }
                Decision::Fail => {
                    warn!(
                        method = %method,
                        path,
                        attempt,
                        kind = record.code(),
                        http_status = record.http_status,
                        retryable = record.retryable,
                        duration_ms = start.elapsed().as_millis() as u64,
                        "catalog request failed"
                    );
                    return Err(record);
                }
            }
        }
    }
}
