use chrono::{DateTime, Utc};
use serde::Deserialize;

/// A recently published video on a channel.
#[derive(Debug, Clone, Deserialize)]
pub struct VideoInfo {
    #[serde(rename = "videoId")]
    pub video_id: String,
    pub title: Option<String>,
    pub url: String,
    #[serde(rename = "publishedAt")]
    pub published_at: Option<DateTime<Utc>>,
}

/// One caption segment of a transcript.
#[derive(Debug, Clone, Deserialize)]
pub struct TranscriptSegment {
    pub text: String,
    /// Offset from the start of the video in seconds.
    #[serde(rename = "offsetSeconds")]
    pub offset_seconds: Option<f64>,
}

/// A full video transcript.
#[derive(Debug, Clone, Deserialize)]
pub struct Transcript {
    #[serde(rename = "videoId")]
    pub video_id: String,
    pub language: Option<String>,
    pub segments: Vec<TranscriptSegment>,
}

impl Transcript {
    /// Concatenated transcript text, segments joined by single spaces.
    pub fn full_text(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Wrapper for transcript API responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    pub data: T,
}
