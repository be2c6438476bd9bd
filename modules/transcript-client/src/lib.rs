pub mod error;
pub mod types;

pub use error::{Result, TranscriptError};
pub use types::{ApiResponse, Transcript, TranscriptSegment, VideoInfo};

const BASE_URL: &str = "https://api.transcriptly.io/v1";

pub struct TranscriptClient {
    client: reqwest::Client,
    token: String,
    base_url: String,
}

impl TranscriptClient {
    pub fn new(token: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            token,
            base_url: BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// List a channel's most recently published videos, newest first.
    pub async fn recent_videos(&self, channel_id: &str, limit: u32) -> Result<Vec<VideoInfo>> {
        tracing::info!(channel_id, limit, "Listing recent videos");

        let url = format!(
            "{}/channels/{}/videos?limit={}",
            self.base_url, channel_id, limit
        );
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TranscriptError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let api_resp: ApiResponse<Vec<VideoInfo>> = resp.json().await?;
        tracing::info!(channel_id, count = api_resp.data.len(), "Fetched video list");
        Ok(api_resp.data)
    }

    /// Fetch the transcript for a single video.
    pub async fn transcript(&self, video_id: &str) -> Result<Transcript> {
        tracing::info!(video_id, "Fetching transcript");

        let url = format!("{}/videos/{}/transcript", self.base_url, video_id);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await?;

        let status = resp.status();
        if status.as_u16() == 404 {
            return Err(TranscriptError::NoTranscript(video_id.to_string()));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TranscriptError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let api_resp: ApiResponse<Transcript> = resp.json().await?;
        tracing::info!(
            video_id,
            segments = api_resp.data.segments.len(),
            "Fetched transcript"
        );
        Ok(api_resp.data)
    }
}
