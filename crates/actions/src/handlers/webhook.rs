//! Generic HTTP webhook handler.
//!
//! Posts each action as a JSON payload to one configured URL:
//! `{ "event_id", "rule_id", "rule_name", "type", "config" }`.

use std::time::Duration;

use serde_json::Value;

use crate::traits::{ActionContext, ActionHandler, HandlerError};

/// Delivers actions as JSON over HTTP to a configured endpoint.
#[derive(Debug, Clone)]
pub struct WebhookHandler {
    url: reqwest::Url,
    /// Shared HTTP client (connection pooling).
    client: reqwest::Client,
}

impl WebhookHandler {
    /// Create a handler posting to `url`. Invalid URLs produce
    /// [`HandlerError::Config`].
    pub fn new(url: &str, timeout: Duration) -> Result<Self, HandlerError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Self::with_client(url, client)
    }

    /// Use a preconfigured client (proxy, TLS, default headers).
    pub fn with_client(url: &str, client: reqwest::Client) -> Result<Self, HandlerError> {
        let url = reqwest::Url::parse(url)
            .map_err(|e| HandlerError::Config(format!("invalid webhook url '{url}': {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(HandlerError::Config(format!(
                "unsupported webhook scheme: {}",
                url.scheme()
            )));
        }
        Ok(Self { url, client })
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }
}

/// JSON body sent for one action.
pub(crate) fn payload(ctx: &ActionContext) -> Result<Value, HandlerError> {
    let mut body = serde_json::to_value(&ctx.action)
        .map_err(|e| HandlerError::Config(format!("failed to serialize action: {e}")))?;
    if let Value::Object(map) = &mut body {
        map.insert("event_id".to_string(), Value::String(ctx.event_id.clone()));
        map.insert("rule_id".to_string(), Value::String(ctx.rule_id.to_string()));
        map.insert("rule_name".to_string(), Value::String(ctx.rule_name.clone()));
    }
    Ok(body)
}

#[async_trait::async_trait]
impl ActionHandler for WebhookHandler {
    async fn handle(&self, ctx: &ActionContext) -> Result<(), HandlerError> {
        let body = payload(ctx)?;

        let response = self
            .client
            .post(self.url.clone())
            .json(&body)
            .send()
            .await?;
        let status = response.status();

        if !status.is_success() {
            let body_text = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            tracing::warn!(
                url = %self.url,
                %status,
                body = %body_text,
                "webhook returned non-2xx status"
            );
            return Err(HandlerError::Rejected(format!(
                "webhook returned {status}: {body_text}"
            )));
        }

        tracing::debug!(
            url = %self.url,
            status = %status,
            event_id = %ctx.event_id,
            "webhook action delivered"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "webhook"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use followup_core::{Action, CreateTicketConfig, RuleId};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn ctx() -> ActionContext {
        ActionContext {
            event_id: "e1".to_string(),
            rule_id: RuleId::from("r1"),
            rule_name: "Escalations".to_string(),
            action: Action::CreateTicket(CreateTicketConfig {
                queue: Some("tier2".to_string()),
                ..Default::default()
            }),
        }
    }

    /// Accept one connection, drain the request, answer with `status_line`.
    async fn one_shot_server(status_line: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
                if request_complete(&buf) {
                    break;
                }
            }
            let response = format!("HTTP/1.1 {status_line}\r\ncontent-length: 2\r\nconnection: close\r\n\r\nok");
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        });
        format!("http://{addr}/hook")
    }

    fn local_client() -> reqwest::Client {
        reqwest::Client::builder()
            .no_proxy()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap()
    }

    fn request_complete(buf: &[u8]) -> bool {
        let text = String::from_utf8_lossy(buf);
        let Some(header_end) = text.find("\r\n\r\n") else {
            return false;
        };
        let content_length = text[..header_end]
            .lines()
            .find_map(|l| {
                let (name, value) = l.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        buf.len() >= header_end + 4 + content_length
    }

    #[test]
    fn payload_shape() {
        let body = payload(&ctx()).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "event_id": "e1",
                "rule_id": "r1",
                "rule_name": "Escalations",
                "type": "create_ticket",
                "config": {"queue": "tier2"}
            })
        );
    }

    #[test]
    fn invalid_url_is_config_error() {
        let result = WebhookHandler::new("not a url", Duration::from_secs(1));
        assert!(matches!(result, Err(HandlerError::Config(_))));
        let result = WebhookHandler::new("ftp://example.com/hook", Duration::from_secs(1));
        assert!(matches!(result, Err(HandlerError::Config(_))));
    }

    #[test]
    fn name_is_webhook() {
        let handler = WebhookHandler::new("https://example.com/hook", Duration::from_secs(1)).unwrap();
        assert_eq!(handler.name(), "webhook");
        assert_eq!(handler.url(), "https://example.com/hook");
    }

    #[tokio::test]
    async fn success_status_is_ok() {
        let url = one_shot_server("200 OK").await;
        let handler = WebhookHandler::with_client(&url, local_client()).unwrap();
        handler.handle(&ctx()).await.unwrap();
    }

    #[tokio::test]
    async fn non_2xx_is_rejected() {
        let url = one_shot_server("503 Service Unavailable").await;
        let handler = WebhookHandler::with_client(&url, local_client()).unwrap();
        match handler.handle(&ctx()).await {
            Err(HandlerError::Rejected(msg)) => assert!(msg.contains("503")),
            other => panic!("expected Rejected, got: {other:?}"),
        }
    }
}
