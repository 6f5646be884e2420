use anyhow::{Context, Result};
use reqwest::blocking::multipart::{Form, Part};
use serde::Deserialize;
use std::time::Duration;

use crate::session::live::RecordedAudio;
use crate::session::metrics::SessionMetrics;

/// What the server hands back for a stored session.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct UploadReceipt {
    pub session_id: i64,
    #[serde(default)]
    pub transcription: Option<String>,
}

/// Posts finished recordings to the storage/transcription service.
pub struct UploadClient {
    url: String,
    user_id: String,
    module_id: Option<String>,
    http: reqwest::blocking::Client,
}

impl UploadClient {
    pub fn new(url: impl Into<String>, user_id: impl Into<String>, module_id: Option<String>) -> Result<Self> {
        let user_id = user_id.into();
        if user_id.trim().is_empty() {
            anyhow::bail!("Upload requires a user id");
        }
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            url: url.into(),
            user_id,
            module_id,
            http,
        })
    }

    pub fn submit(&self, audio: &RecordedAudio, metrics: &SessionMetrics) -> Result<UploadReceipt> {
        let wav = audio.to_wav_bytes()?;
        let metrics_json = serde_json::to_string(metrics).context("Failed to serialize metrics")?;

        let audio_part = Part::bytes(wav)
            .file_name("recording.wav")
            .mime_str("audio/wav")
            .context("Invalid audio MIME type")?;
        let mut form = Form::new()
            .text("user_id", self.user_id.clone())
            .text("metrics", metrics_json)
            .part("audio", audio_part);
        if let Some(ref module_id) = self.module_id {
            form = form.text("module_id", module_id.clone());
        }

        log::info!(
            "Uploading {:.1}s recording to {} for user {}",
            audio.duration(),
            self.url,
            self.user_id
        );
        let response = self
            .http
            .post(&self.url)
            .multipart(form)
            .send()
            .with_context(|| format!("Failed to reach {}", self.url))?;

        let status = response.status();
        let body = response.text().context("Failed to read upload response")?;
        if !status.is_success() {
            anyhow::bail!("Upload rejected ({}): {}", status, body);
        }
        let receipt = parse_receipt(&body)?;
        log::info!("Stored as session {}", receipt.session_id);
        Ok(receipt)
    }
}

pub fn parse_receipt(body: &str) -> Result<UploadReceipt> {
    serde_json::from_str(body).context("Upload response is not a valid receipt")
}
