//! HTTP JSON mail API transport.

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use reqwest::{Client, Url};
use serde::Serialize;

use crate::application::ports::{MailError, MailMessage, MailTransport};

#[derive(Debug, Serialize)]
struct OutgoingAttachment<'a> {
    filename: &'a str,
    content_type: &'a str,
    /// Base64 of the attachment bytes.
    content: String,
}

#[derive(Debug, Serialize)]
struct OutgoingMessage<'a> {
    from: &'a str,
    to: Vec<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    cc: Vec<&'a str>,
    subject: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<OutgoingAttachment<'a>>,
}

fn outgoing<'a>(from: &'a str, message: &'a MailMessage) -> OutgoingMessage<'a> {
    OutgoingMessage {
        from,
        to: vec![message.to.as_str()],
        cc: message.cc.iter().map(String::as_str).collect(),
        subject: &message.subject,
        text: message.body.as_deref(),
        attachments: message
            .attachment
            .iter()
            .map(|attachment| OutgoingAttachment {
                filename: &attachment.filename,
                content_type: &attachment.content_type,
                content: B64.encode(&attachment.data),
            })
            .collect(),
    }
}

/// Posts each message as one JSON document to the provider endpoint.
#[derive(Debug, Clone)]
pub struct HttpMailTransport {
    client: Client,
    endpoint: Url,
    api_key: String,
    from: String,
}

impl HttpMailTransport {
    pub fn new(endpoint: Url, api_key: String, from: String) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(concat!("docket/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            endpoint,
            api_key,
            from,
        })
    }
}

#[async_trait]
impl MailTransport for HttpMailTransport {
    async fn send(&self, message: MailMessage) -> Result<(), MailError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(&outgoing(&self.from, &message))
            .send()
            .await
            .map_err(|err| MailError::Request(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MailError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}
