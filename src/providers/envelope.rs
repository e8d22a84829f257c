//! Every outbound call of every provider goes through [`HttpEnvelope`], which
//! writes one [`CallAuditRecord`] per attempt and a [`FailureRecord`] per failure.

use crate::core::audit::{CallAuditRecord, FailureRecord};
use crate::core::store::AuditStore;
use crate::error::{RateError, RateResult};
use chrono::Utc;
use reqwest::Method;
use std::backtrace::Backtrace;
use std::collections::BTreeMap;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Strips the query string so API keys never reach the audit trail.
pub fn strip_query(url: &str) -> &str {
    match url.split_once('?') {
        Some((base, _)) => base,
        None => url,
    }
}

#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub url: String,
    pub method: Method,
    pub body: Option<String>,
    pub headers: Vec<(&'static str, &'static str)>,
}

impl OutboundRequest {
    pub fn get(url: impl Into<String>) -> Self {
        OutboundRequest {
            url: url.into(),
            method: Method::GET,
            body: None,
            headers: Vec::new(),
        }
    }

    pub fn with_headers(mut self, headers: &[(&'static str, &'static str)]) -> Self {
        self.headers.extend_from_slice(headers);
        self
    }

    pub fn with_body(mut self, method: Method, body: impl Into<String>) -> Self {
        self.method = method;
        self.body = Some(body.into());
        self
    }

    pub fn logged_url(&self) -> &str {
        strip_query(&self.url)
    }

    fn headers_json(&self) -> Option<String> {
        if self.headers.is_empty() {
            return None;
        }
        let headers: BTreeMap<_, _> = self.headers.iter().copied().collect();
        serde_json::to_string(&headers).ok()
    }
}

/// An in-flight log entry. [`InFlightCall::finish`] consumes it on the normal
/// exit path of [`HttpEnvelope::send`]. If the call future is dropped first,
/// the entry is written from a spawned task and marked as cancelled.
struct InFlightCall {
    record: CallAuditRecord,
    audit: Arc<dyn AuditStore>,
    pending: bool,
}

impl InFlightCall {
    fn open(request: &OutboundRequest, audit: Arc<dyn AuditStore>) -> Self {
        let now = Utc::now();
        InFlightCall {
            record: CallAuditRecord {
                id: 0,
                request_url: request.logged_url().to_string(),
                request_method: request.method.to_string(),
                request_body: request.body.clone(),
                request_headers: request.headers_json(),
                response_text: None,
                created: now,
                finished: now,
                error: None,
            },
            audit,
            pending: true,
        }
    }

    fn finish(mut self, outcome: &RateResult<String>) -> CallAuditRecord {
        match outcome {
            Ok(text) => self.record.response_text = Some(text.clone()),
            Err(err) => self.record.error = Some(error_chain(err)),
        }
        self.record.finished = Utc::now();
        self.pending = false;
        self.record.clone()
    }
}

impl Drop for InFlightCall {
    fn drop(&mut self) {
        if !self.pending {
            return;
        }
        let mut record = self.record.clone();
        record.error = Some(CANCELLED.to_string());
        record.finished = Utc::now();

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let audit = self.audit.clone();
                handle.spawn(async move {
                    if let Err(e) = audit.append_call(record).await {
                        warn!(error = %e, "Failed to persist cancelled call audit record");
                    }
                });
            }
            Err(_) => warn!(url = %record.request_url, "Call cancelled outside a runtime, not audited"),
        }
    }
}

const CANCELLED: &str = "request cancelled before completion";

fn causes<'a>(
    err: &'a (dyn Error + 'static),
) -> impl Iterator<Item = &'a (dyn Error + 'static)> {
    std::iter::successors(Some(err), |e| {
        let e: &'a (dyn Error + 'static) = *e;
        e.source()
    })
}

/// The error and all of its causes on one line. A cause already rendered as
/// the tail of the message is not repeated.
fn error_chain(err: &(dyn Error + 'static)) -> String {
    let mut out = err.to_string();
    for inner in causes(err).skip(1) {
        let text = inner.to_string();
        if !out.ends_with(&text) {
            out.push_str(": ");
            out.push_str(&text);
        }
    }
    out
}

/// Renders the error chain followed by a backtrace. The backtrace is captured
/// when the failure is recorded, so it shows the recording site inside the
/// envelope rather than where the error arose.
fn traceback(err: &(dyn Error + 'static)) -> String {
    let mut out = err.to_string();
    for inner in causes(err).skip(1) {
        out.push_str(&format!("\nCaused by: {inner}"));
    }
    out.push_str(&format!(
        "\n\nStack backtrace:\n{}",
        Backtrace::force_capture()
    ));
    out
}

pub struct HttpEnvelope {
    client: reqwest::Client,
    audit: Arc<dyn AuditStore>,
}

impl HttpEnvelope {
    pub fn new(timeout: Duration, audit: Arc<dyn AuditStore>) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        Ok(Self { client, audit })
    }

    /// Performs one call and returns the raw response text.
    ///
    /// Non-success statuses count as failures. Errors are returned exactly as
    /// produced after being recorded; audit write failures are only logged.
    #[instrument(
        name = "ApiCall",
        skip(self, request),
        fields(method = %request.method, url = %request.logged_url())
    )]
    pub async fn send(&self, request: &OutboundRequest) -> RateResult<String> {
        let call = InFlightCall::open(request, self.audit.clone());
        let outcome = self.dispatch(request).await;
        let record = call.finish(&outcome);

        self.persist_call(record).await;
        if let Err(err) = &outcome {
            warn!(error = %err, "Error during request sending");
            self.record_failure(request, err).await;
        }
        outcome
    }

    /// Sends and parses. A parse failure is recorded as a failure of the
    /// request that produced the unparseable body.
    pub async fn send_and_parse<T>(
        &self,
        request: &OutboundRequest,
        parse: impl FnOnce(&str) -> RateResult<T>,
    ) -> RateResult<T> {
        let text = self.send(request).await?;
        match parse(&text) {
            Ok(value) => Ok(value),
            Err(err) => {
                warn!(error = %err, url = %request.logged_url(), "Failed to parse response");
                self.record_failure(request, &err).await;
                Err(err)
            }
        }
    }

    async fn dispatch(&self, request: &OutboundRequest) -> RateResult<String> {
        let url = request.logged_url().to_string();
        let mut builder = self.client.request(request.method.clone(), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(*name, *value);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let network_error = |source: reqwest::Error| RateError::Network {
            url: url.clone(),
            source: source.without_url(),
        };
        let response = builder.send().await.map_err(network_error)?;
        debug!(status = %response.status(), "Received response");

        let status = response.status();
        if !status.is_success() {
            return Err(RateError::HttpStatus {
                url: url.clone(),
                status: status.as_u16(),
            });
        }
        response.text().await.map_err(network_error)
    }

    async fn persist_call(&self, record: CallAuditRecord) {
        if let Err(e) = self.audit.append_call(record).await {
            warn!(error = %e, "Failed to persist call audit record");
        }
    }

    async fn record_failure(&self, request: &OutboundRequest, err: &RateError) {
        let record = FailureRecord {
            id: 0,
            request_url: request.logged_url().to_string(),
            request_method: request.method.to_string(),
            request_body: request.body.clone(),
            error: error_chain(err),
            traceback: traceback(err),
            created: Utc::now(),
        };
        if let Err(e) = self.audit.append_failure(record).await {
            warn!(error = %e, "Failed to persist failure record");
        }
    }
}
