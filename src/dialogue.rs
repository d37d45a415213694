//! # Dialogue Engine Client
//!
//! Forwards each transcript to the conversational webhook (a Rasa-style
//! REST channel) and passes the JSON reply through untouched. One POST per
//! transcript: no retry, no explicit timeout beyond the HTTP client default,
//! no interpretation of the reply.

use crate::error::{AppError, AppResult};
use serde::Serialize;
use tracing::debug;

/// The wire shape of an outbound webhook message.
#[derive(Debug, Serialize)]
struct WebhookMessage<'a> {
    sender: &'a str,
    message: &'a str,
}

/// HTTP client for the dialogue engine webhook.
#[derive(Debug, Clone)]
pub struct DialogueClient {
    http: reqwest::Client,
    webhook_url: String,
    sender: String,
}

impl DialogueClient {
    pub fn new(webhook_url: String, sender: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            webhook_url,
            sender,
        }
    }

    /// POST the transcript and return the engine's JSON reply verbatim.
    ///
    /// The message text is the transcript exactly as produced; no trimming
    /// or escaping beyond standard JSON encoding.
    pub async fn dispatch(&self, transcript: &str) -> AppResult<serde_json::Value> {
        let body = WebhookMessage {
            sender: &self.sender,
            message: transcript,
        };

        debug!(url = %self.webhook_url, sender = %self.sender, "Dispatching transcript");

        let response = self
            .http
            .post(&self.webhook_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Dialogue(format!("webhook request failed: {}", e)))?;

        let action = response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| AppError::Dialogue(format!("webhook reply was not JSON: {}", e)))?;

        Ok(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;

    /// One-shot HTTP stub: accepts a single request, captures it, and
    /// answers with the given body. Returns (url, join handle → raw request).
    fn spawn_stub(status_line: &'static str, reply_body: &'static str) -> (String, std::thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/webhooks/rest/webhook", listener.local_addr().unwrap());

        let handle = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = stream.read(&mut buf).unwrap();
                raw.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&raw);
                if let Some(header_end) = text.find("\r\n\r\n") {
                    let content_length = text
                        .lines()
                        .find(|l| l.to_lowercase().starts_with("content-length:"))
                        .and_then(|l| l.split(':').nth(1))
                        .and_then(|v| v.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    if raw.len() >= header_end + 4 + content_length {
                        break;
                    }
                }
            }

            let response = format!(
                "{}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                reply_body.len(),
                reply_body
            );
            stream.write_all(response.as_bytes()).unwrap();
            String::from_utf8_lossy(&raw).into_owned()
        });

        (url, handle)
    }

    #[test]
    fn message_field_carries_transcript_verbatim() {
        let transcript = "  Bonjour, j'aimerais un \"rendez-vous\" demain.  ";
        let body = WebhookMessage {
            sender: "user",
            message: transcript,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["sender"], "user");
        assert_eq!(value["message"], transcript);
    }

    #[tokio::test]
    async fn dispatch_posts_once_and_passes_reply_through() {
        let reply = r#"[{"recipient_id":"user","text":"Bonjour !"}]"#;
        let (url, handle) = spawn_stub("HTTP/1.1 200 OK", reply);

        let client = DialogueClient::new(url, "user".to_string());
        let action = client.dispatch("Bonjour, comment allez-vous ?").await.unwrap();

        assert_eq!(action[0]["text"], "Bonjour !");

        let request = handle.join().unwrap();
        assert!(request.starts_with("POST /webhooks/rest/webhook"));
        let body_start = request.find("\r\n\r\n").unwrap() + 4;
        let sent: serde_json::Value = serde_json::from_str(&request[body_start..]).unwrap();
        assert_eq!(sent["sender"], "user");
        assert_eq!(sent["message"], "Bonjour, comment allez-vous ?");
    }

    #[tokio::test]
    async fn dispatch_surfaces_connection_failure() {
        // Bind then drop to get a port with nothing listening
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let client = DialogueClient::new(
            format!("http://127.0.0.1:{}/webhooks/rest/webhook", port),
            "user".to_string(),
        );

        let err = client.dispatch("bonjour").await.unwrap_err();
        assert_eq!(err.kind(), "dialogue_engine");
    }

    #[tokio::test]
    async fn dispatch_rejects_non_json_reply() {
        let (url, handle) = spawn_stub("HTTP/1.1 200 OK", "this is not json");

        let client = DialogueClient::new(url, "user".to_string());
        let err = client.dispatch("bonjour").await.unwrap_err();

        assert_eq!(err.kind(), "dialogue_engine");
        handle.join().unwrap();
    }
}
