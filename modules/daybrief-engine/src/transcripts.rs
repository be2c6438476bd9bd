//! Video discovery and transcripts for the video gatherer.

use async_trait::async_trait;

use daybrief_common::error::{DaybriefError, Result};
use daybrief_common::Channel;
use transcript_client::{TranscriptClient, TranscriptError};

// --- TranscriptProvider trait ---

#[async_trait]
pub trait TranscriptProvider: Send + Sync {
    /// A channel's most recently published videos, newest first.
    async fn recent_videos(&self, channel: &Channel, limit: u32) -> Result<Vec<VideoRef>>;

    /// Full transcript text for one video. `None` when the video has no
    /// transcript — a per-video skip, not a failure.
    async fn transcript(&self, video_id: &str) -> Result<Option<String>>;
}

#[derive(Debug, Clone)]
pub struct VideoRef {
    pub video_id: String,
    pub url: String,
    pub title: Option<String>,
}

// --- Hosted transcript API implementation ---

pub struct ApiTranscriptProvider {
    client: TranscriptClient,
}

impl ApiTranscriptProvider {
    pub fn new(client: TranscriptClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TranscriptProvider for ApiTranscriptProvider {
    async fn recent_videos(&self, channel: &Channel, limit: u32) -> Result<Vec<VideoRef>> {
        let videos = self
            .client
            .recent_videos(&channel.external_id, limit)
            .await
            .map_err(provider_error)?;

        Ok(videos
            .into_iter()
            .map(|v| VideoRef {
                video_id: v.video_id,
                url: v.url,
                title: v.title,
            })
            .collect())
    }

    async fn transcript(&self, video_id: &str) -> Result<Option<String>> {
        match self.client.transcript(video_id).await {
            Ok(transcript) => Ok(Some(transcript.full_text())),
            Err(TranscriptError::NoTranscript(_)) => Ok(None),
            Err(e) => Err(provider_error(e)),
        }
    }
}

fn provider_error(e: TranscriptError) -> DaybriefError {
    match e {
        TranscriptError::Network(msg) => DaybriefError::ProviderTransient(msg),
        TranscriptError::Api { status, message } if status == 429 || status >= 500 => {
            DaybriefError::ProviderTransient(format!("transcript API {status}: {message}"))
        }
        TranscriptError::Api { status, message } => {
            DaybriefError::ProviderFatal(format!("transcript API {status}: {message}"))
        }
        TranscriptError::Parse(msg) => DaybriefError::ProviderFatal(msg),
        TranscriptError::NoTranscript(id) => {
            DaybriefError::ProviderFatal(format!("no transcript for {id}"))
        }
    }
}
