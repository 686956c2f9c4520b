//! Dify workflow client.
//!
//! Blocking calls are tried first. When a blocking call times out the same
//! prompt is sent again in streaming mode, which keeps the connection alive
//! for long generations.

use futures::StreamExt;
use reqwest::header::RETRY_AFTER;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::DifyConfig;
use crate::retry::{retry, RetryConfig, Retryable};

/// Dify API errors
#[derive(Debug, Error)]
pub enum DifyError {
    #[error("Dify API key is not configured")]
    MissingApiKey,

    #[error("Dify request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Dify returned HTTP {status}: {body}")]
    Status {
        status: u16,
        body: String,
        retry_after: Option<Duration>,
    },

    #[error("Dify workflow {status}: {message}")]
    Workflow { status: String, message: String },

    #[error("Dify stream error: {0}")]
    Stream(String),

    #[error("Invalid Dify response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Dify returned an empty answer")]
    EmptyAnswer,
}

impl Retryable for DifyError {
    fn is_retryable(&self) -> bool {
        match self {
            DifyError::Request(e) => e.is_connect(),
            DifyError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            DifyError::Status { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl DifyError {
    fn is_timeout(&self) -> bool {
        matches!(self, DifyError::Request(e) if e.is_timeout())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResponseMode {
    Blocking,
    Streaming,
}

impl ResponseMode {
    fn as_str(&self) -> &'static str {
        match self {
            ResponseMode::Blocking => "blocking",
            ResponseMode::Streaming => "streaming",
        }
    }
}

#[derive(Debug, Deserialize)]
struct BlockingResponse {
    data: WorkflowData,
}

#[derive(Debug, Default, Deserialize)]
struct WorkflowData {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    outputs: Option<Map<String, Value>>,
    #[serde(default)]
    error: Option<String>,
}

impl WorkflowData {
    fn into_answer(self, output_key: &str) -> Result<String, DifyError> {
        if let Some(status) = self.status.filter(|s| s != "succeeded") {
            return Err(DifyError::Workflow {
                status,
                message: self.error.unwrap_or_default(),
            });
        }
        Ok(self
            .outputs
            .as_ref()
            .and_then(|outputs| pick_output(outputs, output_key))
            .unwrap_or_default())
    }
}

/// Configured output variable, else the first string output
fn pick_output(outputs: &Map<String, Value>, key: &str) -> Option<String> {
    outputs
        .get(key)
        .and_then(Value::as_str)
        .or_else(|| outputs.values().find_map(Value::as_str))
        .map(str::to_string)
}

/// Accumulates SSE events of one streaming run
#[derive(Debug, Default)]
struct StreamState {
    text: String,
    finished: Option<String>,
}

impl StreamState {
    fn feed_line(&mut self, line: &str, output_key: &str) -> Result<(), DifyError> {
        let Some(payload) = line.trim().strip_prefix("data:") else {
            return Ok(());
        };
        let payload = payload.trim();
        if payload.is_empty() {
            return Ok(());
        }
        let Ok(event) = serde_json::from_str::<Value>(payload) else {
            debug!("Skipping undecodable SSE line");
            return Ok(());
        };

        match event.get("event").and_then(Value::as_str) {
            Some("text_chunk") => {
                if let Some(text) = event.pointer("/data/text").and_then(Value::as_str) {
                    self.text.push_str(text);
                }
            }
            Some("workflow_finished") => {
                let data = event
                    .get("data")
                    .cloned()
                    .map(serde_json::from_value::<WorkflowData>)
                    .transpose()?
                    .unwrap_or_default();
                let answer = data.into_answer(output_key)?;
                if !answer.trim().is_empty() {
                    self.finished = Some(answer);
                }
            }
            Some("error") => {
                let message = event
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error");
                return Err(DifyError::Stream(message.to_string()));
            }
            _ => {}
        }
        Ok(())
    }

    fn finish(self) -> String {
        self.finished.unwrap_or(self.text)
    }
}

/// Client for `POST /workflows/run`
#[derive(Clone)]
pub struct DifyClient {
    client: reqwest::Client,
    config: DifyConfig,
    retry: RetryConfig,
}

impl DifyClient {
    pub fn new(config: &DifyConfig) -> Result<Self, DifyError> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            config: config.clone(),
            retry: RetryConfig::workflow(config.max_retries),
        })
    }

    /// Override the retry policy
    #[cfg(test)]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/workflows/run", self.config.base_url.trim_end_matches('/'))
    }

    fn request_body(&self, prompt: &str, mode: ResponseMode) -> Value {
        let mut inputs = Map::new();
        inputs.insert(
            self.config.input_key.clone(),
            Value::String(prompt.to_string()),
        );
        serde_json::json!({
            "inputs": inputs,
            "response_mode": mode.as_str(),
            "user": self.config.user,
        })
    }

    async fn send(
        &self,
        prompt: &str,
        mode: ResponseMode,
        timeout: Duration,
    ) -> Result<reqwest::Response, DifyError> {
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .timeout(timeout)
            .json(&self.request_body(prompt, mode))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = response.text().await.unwrap_or_default();
        Err(DifyError::Status {
            status: status.as_u16(),
            body,
            retry_after,
        })
    }

    async fn run_blocking_once(&self, prompt: &str) -> Result<String, DifyError> {
        let timeout = Duration::from_secs(self.config.blocking_timeout_secs);
        let response = self.send(prompt, ResponseMode::Blocking, timeout).await?;
        let body = response.text().await?;
        let parsed: BlockingResponse = serde_json::from_str(&body)?;
        parsed.data.into_answer(&self.config.output_key)
    }

    async fn run_streaming_once(&self, prompt: &str) -> Result<String, DifyError> {
        let timeout = Duration::from_secs(self.config.stream_timeout_secs);
        let response = self.send(prompt, ResponseMode::Streaming, timeout).await?;

        let mut state = StreamState::default();
        let mut buffer: Vec<u8> = Vec::new();
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            buffer.extend_from_slice(&chunk?);
            while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=pos).collect();
                state.feed_line(&String::from_utf8_lossy(&line), &self.config.output_key)?;
            }
        }
        if !buffer.is_empty() {
            state.feed_line(&String::from_utf8_lossy(&buffer), &self.config.output_key)?;
        }

        Ok(state.finish())
    }

    async fn run_streaming(&self, prompt: &str) -> Result<String, DifyError> {
        retry(&self.retry, "Dify streaming run", || {
            self.run_streaming_once(prompt)
        })
        .await
    }

    /// Run the workflow and return the answer text
    pub async fn run(&self, prompt: &str) -> Result<String, DifyError> {
        if self.config.api_key.trim().is_empty() {
            return Err(DifyError::MissingApiKey);
        }

        info!("Sending prompt to Dify ({} chars)", prompt.chars().count());
        let answer = if self.config.streaming {
            self.run_streaming(prompt).await?
        } else {
            let blocking = retry(&self.retry, "Dify blocking run", || {
                self.run_blocking_once(prompt)
            })
            .await;
            match blocking {
                Err(e) if e.is_timeout() => {
                    warn!("Blocking Dify call timed out, retrying in streaming mode");
                    self.run_streaming(prompt).await?
                }
                other => other?,
            }
        };

        let answer = answer.trim();
        if answer.is_empty() {
            return Err(DifyError::EmptyAnswer);
        }
        Ok(answer.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(base: &str) -> DifyClient {
        let config = DifyConfig {
            base_url: base.to_string(),
            api_key: "app-test".to_string(),
            blocking_timeout_secs: 1,
            stream_timeout_secs: 5,
            ..Default::default()
        };
        DifyClient::new(&config).unwrap().with_retry(RetryConfig {
            max_retries: 2,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
            multiplier: 2.0,
        })
    }

    fn sse(events: &[Value]) -> String {
        events
            .iter()
            .map(|e| format!("data: {}\n\n", e))
            .collect()
    }

    #[tokio::test]
    async fn test_blocking_answer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/workflows/run"))
            .and(header("authorization", "Bearer app-test"))
            .and(body_partial_json(json!({
                "inputs": {"text": "プロンプト"},
                "response_mode": "blocking",
                "user": "nankan-api"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "workflow_run_id": "r1",
                "data": {"status": "succeeded", "outputs": {"text": "◎ 3 サンプル"}}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let answer = client(&server.uri()).run("プロンプト").await.unwrap();
        assert_eq!(answer, "◎ 3 サンプル");
    }

    #[tokio::test]
    async fn test_blocking_first_string_output() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"status": "succeeded", "outputs": {"count": 3, "result": "予想本文"}}
            })))
            .mount(&server)
            .await;

        let answer = client(&server.uri()).run("p").await.unwrap();
        assert_eq!(answer, "予想本文");
    }

    #[tokio::test]
    async fn test_failed_workflow() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"status": "failed", "outputs": null, "error": "node crashed"}
            })))
            .mount(&server)
            .await;

        let err = client(&server.uri()).run("p").await.unwrap_err();
        assert!(matches!(err, DifyError::Workflow { ref message, .. } if message == "node crashed"));
    }

    #[tokio::test]
    async fn test_retries_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"status": "succeeded", "outputs": {"text": "ok"}}
            })))
            .expect(1)
            .mount(&server)
            .await;

        assert_eq!(client(&server.uri()).run("p").await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn test_client_error_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad inputs"))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server.uri()).run("p").await.unwrap_err();
        assert!(matches!(err, DifyError::Status { status: 400, .. }));
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let config = DifyConfig::default();
        let err = DifyClient::new(&config).unwrap().run("p").await.unwrap_err();
        assert!(matches!(err, DifyError::MissingApiKey));
    }

    #[tokio::test]
    async fn test_empty_answer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"status": "succeeded", "outputs": {"text": "  "}}
            })))
            .mount(&server)
            .await;

        let err = client(&server.uri()).run("p").await.unwrap_err();
        assert!(matches!(err, DifyError::EmptyAnswer));
    }

    #[tokio::test]
    async fn test_timeout_falls_back_to_streaming() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"response_mode": "blocking"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_secs(3))
                    .set_body_json(json!({"data": {"status": "succeeded", "outputs": {"text": "late"}}})),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"response_mode": "streaming"})))
            .respond_with(ResponseTemplate::new(200).set_body_string(sse(&[
                json!({"event": "workflow_started", "data": {}}),
                json!({"event": "text_chunk", "data": {"text": "◎ 5 "}}),
                json!({"event": "text_chunk", "data": {"text": "ストリーム"}}),
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let answer = client(&server.uri()).run("p").await.unwrap();
        assert_eq!(answer, "◎ 5 ストリーム");
    }

    #[test]
    fn test_stream_finished_outputs_override_chunks() {
        let mut state = StreamState::default();
        for line in [
            "event: ping",
            r#"data: {"event": "text_chunk", "data": {"text": "途中"}}"#,
            "",
            r#"data: {"event": "workflow_finished", "data": {"status": "succeeded", "outputs": {"text": "最終回答"}}}"#,
        ] {
            state.feed_line(line, "text").unwrap();
        }
        assert_eq!(state.finish(), "最終回答");
    }

    #[test]
    fn test_stream_error_event() {
        let mut state = StreamState::default();
        let err = state
            .feed_line(r#"data: {"event": "error", "message": "quota exceeded"}"#, "text")
            .unwrap_err();
        assert!(matches!(err, DifyError::Stream(ref m) if m == "quota exceeded"));
    }

    #[test]
    fn test_retry_after_is_exposed() {
        let err = DifyError::Status {
            status: 429,
            body: String::new(),
            retry_after: Some(Duration::from_secs(7)),
        };
        assert!(err.is_retryable());
        assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
    }
}
