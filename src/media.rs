use anyhow::anyhow;
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use tracing::{info, warn};

use crate::{
    GetField,
    config::MediaConfig,
    conversation::MessageKind,
    error::{ChatError, ChatResult},
};

/// Unsigned uploads to a Cloudinary-compatible media host.
#[derive(Clone)]
pub struct MediaClient {
    http: reqwest::Client,
    config: Option<MediaConfig>,
}

impl MediaClient {
    pub fn new(config: Option<MediaConfig>) -> Self {
        Self { http: reqwest::Client::new(), config }
    }

    pub fn is_configured(&self) -> bool {
        self.config.is_some()
    }

    /// Uploads `bytes` and returns the hosted URL to store on the message.
    pub async fn upload(&self, kind: MessageKind, bytes: Vec<u8>) -> ChatResult<String> {
        let config = self.config.as_ref().ok_or(ChatError::MediaUnavailable)?;
        let url = upload_url(config, kind)?;

        let form = Form::new()
            .part("file", Part::bytes(bytes).file_name(file_name(kind)))
            .text("upload_preset", config.upload_preset.clone());

        let response = self.http.post(&url).multipart(form).send().await?;
        let status = response.status();
        let body: Value = response.json().await?;
        if !status.is_success() {
            warn!(%status, kind = %kind, "media upload rejected");
            return Err(ChatError::Transport(anyhow!(
                "media host answered {status}: {}",
                rejection_reason(&body)
            )));
        }

        let hosted = hosted_url(&body)?;
        info!(kind = %kind, url = %hosted, "media uploaded");
        Ok(hosted)
    }
}

/// Audio lives under the host's `video` resource type.
fn resource_type(kind: MessageKind) -> ChatResult<&'static str> {
    match kind {
        MessageKind::Image | MessageKind::Drawing => Ok("image"),
        MessageKind::Audio => Ok("video"),
        MessageKind::Text => Err(ChatError::InvalidMessage("text has nothing to upload".to_owned())),
    }
}

fn upload_url(config: &MediaConfig, kind: MessageKind) -> ChatResult<String> {
    Ok(format!(
        "{}/v1_1/{}/{}/upload",
        config.base_url.trim_end_matches('/'),
        config.cloud_name,
        resource_type(kind)?
    ))
}

fn file_name(kind: MessageKind) -> &'static str {
    match kind {
        MessageKind::Audio => "voice.webm",
        MessageKind::Drawing => "drawing.png",
        _ => "image",
    }
}

fn hosted_url(body: &Value) -> ChatResult<String> {
    body.get_str_field("secure_url")
        .map_err(|e| ChatError::Transport(e.0))
}

fn rejection_reason(body: &Value) -> String {
    body.get_obj_field("error")
        .and_then(|error| error.get_str_field("message"))
        .unwrap_or_else(|_| body.to_string())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn config() -> MediaConfig {
        MediaConfig {
            base_url: "https://api.cloudinary.com/".to_owned(),
            cloud_name: "demo".to_owned(),
            upload_preset: "unsigned".to_owned(),
        }
    }

    #[test]
    fn urls_pick_the_resource_type() {
        assert_eq!(
            upload_url(&config(), MessageKind::Image).unwrap(),
            "https://api.cloudinary.com/v1_1/demo/image/upload"
        );
        assert_eq!(
            upload_url(&config(), MessageKind::Drawing).unwrap(),
            "https://api.cloudinary.com/v1_1/demo/image/upload"
        );
        assert_eq!(
            upload_url(&config(), MessageKind::Audio).unwrap(),
            "https://api.cloudinary.com/v1_1/demo/video/upload"
        );
        assert!(matches!(upload_url(&config(), MessageKind::Text), Err(ChatError::InvalidMessage(_))));
    }

    #[test]
    fn reads_the_hosted_url_or_the_reason() {
        let ok = json!({ "secure_url": "https://res.cloudinary.com/demo/a.png", "public_id": "a" });
        assert_eq!(hosted_url(&ok).unwrap(), "https://res.cloudinary.com/demo/a.png");

        let missing = json!({ "public_id": "a" });
        assert!(hosted_url(&missing).unwrap_err().is_transport());

        let rejected = json!({ "error": { "message": "Upload preset not found" } });
        assert_eq!(rejection_reason(&rejected), "Upload preset not found");
    }

    #[tokio::test]
    async fn unconfigured_client_refuses() {
        let client = MediaClient::new(None);
        assert!(!client.is_configured());
        let err = client.upload(MessageKind::Image, vec![1, 2, 3]).await.unwrap_err();
        assert!(matches!(err, ChatError::MediaUnavailable));
    }
}
