//! Streaming chat seam for the external LLM collaborator.
//!
//! The core only knows how to POST an OpenAI-compatible payload and pump
//! the SSE response into a bounded channel of text deltas; provider choice,
//! keys and conversation state belong to the layer above. Dropping the
//! receiver cancels the stream at the producer's next send.

use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::debug;

use crate::codec::sse;
use crate::error::FetchResult;
use crate::net::{host_of, Gateway};

#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Chat-completions endpoint, e.g. `https://api.deepseek.com/v1/chat/completions`.
    pub api_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".into(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".into(), content: content.into() }
    }
}

/// Extract the delta text from one SSE payload. Providers that stream whole
/// `message` objects instead of deltas are accepted too.
fn delta_text(payload: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(payload).ok()?;
    let choice = value.get("choices")?.get(0)?;
    let content = choice
        .pointer("/delta/content")
        .or_else(|| choice.pointer("/message/content"))?
        .as_str()?;
    if content.is_empty() {
        None
    } else {
        Some(content.to_string())
    }
}

/// Start a streaming chat completion and return the delta channel. The
/// producer closes the channel when the provider sends `[DONE]` or the
/// transport ends.
pub async fn stream_chat(
    gateway: &Gateway,
    config: &LlmConfig,
    messages: &[ChatMessage],
) -> FetchResult<mpsc::Receiver<String>> {
    let payload = json!({
        "model": config.model,
        "messages": messages,
        "temperature": config.temperature,
        "stream": true,
    });
    let host = host_of(&config.api_url).unwrap_or_else(|| "llm".to_string());
    let auth = format!("Bearer {}", config.api_key);
    let response = gateway
        .post_stream(&host, &config.api_url, &[("Authorization", auth)], &payload)
        .await?;

    let mut raw = sse::spawn_pump(response);
    let (tx, rx) = mpsc::channel(sse::SSE_CHANNEL_CAPACITY);
    tokio::spawn(async move {
        while let Some(payload) = raw.recv().await {
            if let Some(text) = delta_text(&payload) {
                if tx.send(text).await.is_err() {
                    debug!("chat consumer dropped, stopping stream");
                    break;
                }
            }
        }
    });
    Ok(rx)
}

/// Drain a delta channel into the full reply. Convenience for callers that
/// do not render incrementally.
pub async fn collect_reply(mut rx: mpsc::Receiver<String>) -> String {
    let mut reply = String::new();
    while let Some(delta) = rx.recv().await {
        reply.push_str(&delta);
    }
    reply
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_extraction_handles_both_shapes() {
        assert_eq!(
            delta_text(r#"{"choices":[{"delta":{"content":"你好"}}]}"#),
            Some("你好".to_string())
        );
        assert_eq!(
            delta_text(r#"{"choices":[{"message":{"content":"full"}}]}"#),
            Some("full".to_string())
        );
        assert_eq!(delta_text(r#"{"choices":[{"delta":{}}]}"#), None);
        assert_eq!(delta_text(r#"{"choices":[{"delta":{"content":""}}]}"#), None);
        assert_eq!(delta_text("not json"), None);
    }

    #[tokio::test]
    async fn collect_reply_concatenates_deltas() {
        let (tx, rx) = mpsc::channel(8);
        tx.send("分析".to_string()).await.unwrap();
        tx.send("完成".to_string()).await.unwrap();
        drop(tx);
        assert_eq!(collect_reply(rx).await, "分析完成");
    }
}
