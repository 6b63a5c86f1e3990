use std::time::Duration;

use sheetcam_core::Frame;
use ureq::Agent;

use super::FrameSource;
use crate::error::SourceError;

/// Polls an HTTP endpoint that serves the latest still (e.g. `/last.jpg`).
pub struct SnapshotSource {
    url: String,
    timeout: Duration,
    agent: Option<Agent>,
}

impl SnapshotSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            timeout,
            agent: None,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl FrameSource for SnapshotSource {
    fn open(&mut self) -> Result<(), SourceError> {
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(SourceError::Open(format!("not an http url: {}", self.url)));
        }
        let agent: Agent = Agent::config_builder()
            .timeout_global(Some(self.timeout))
            .build()
            .into();
        self.agent = Some(agent);
        Ok(())
    }

    fn read(&mut self) -> Result<Frame, SourceError> {
        let agent = self
            .agent
            .as_ref()
            .ok_or_else(|| SourceError::SourceUnavailable("source not opened".into()))?;

        // non-2xx statuses surface as errors here
        let resp = agent
            .get(&self.url)
            .call()
            .map_err(|e| SourceError::SourceUnavailable(format!("{}: {e}", self.url)))?;

        let content_type = resp
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(str::to_ascii_lowercase);
        if let Some(ct) = content_type {
            if !ct.contains("image") {
                return Err(SourceError::SourceUnavailable(format!(
                    "{} returned {ct}",
                    self.url
                )));
            }
        }

        let bytes = resp
            .into_body()
            .read_to_vec()
            .map_err(|e| SourceError::SourceUnavailable(format!("{}: {e}", self.url)))?;
        if bytes.is_empty() {
            return Err(SourceError::SourceUnavailable(format!(
                "{} returned an empty body",
                self.url
            )));
        }
        let img = image::load_from_memory(&bytes)?;
        Ok(Frame::new(img.to_rgb8()))
    }

    fn release(&mut self) {
        self.agent = None;
    }

    fn describe(&self) -> String {
        format!("snapshot {}", self.url)
    }
}
