//! Progressive HLS playlist for a stream.
//!
//! The playlist lists only ready segments that form a contiguous prefix of
//! the stream, so a player can start on chunk 0 while later chunks are still
//! being synthesized. Segments that become ready out of order wait in a
//! reorder buffer. While the stream is growing the playlist is an `EVENT`
//! playlist; once every segment is listed (or the stream is sealed as partial)
//! it becomes `VOD` and ends with `#EXT-X-ENDLIST`.

use crate::defaults;
use crate::error::{Result, VoxcastError};
use crate::upload::{UploadHints, UploadReceipt, Uploader, manifest_key};
use std::collections::BTreeMap;

/// A ready audio segment.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub chunk_index: u32,
    pub url: String,
    pub duration_seconds: f64,
}

impl Segment {
    pub fn new(chunk_index: u32, url: impl Into<String>, duration_seconds: f64) -> Self {
        Self {
            chunk_index,
            url: url.into(),
            duration_seconds,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ManifestBuilder {
    stream_id: String,
    total_chunks: u32,
    pending: BTreeMap<u32, Segment>,
    listed: Vec<Segment>,
    sealed: bool,
}

impl ManifestBuilder {
    pub fn new(stream_id: impl Into<String>, total_chunks: u32) -> Self {
        Self {
            stream_id: stream_id.into(),
            total_chunks,
            pending: BTreeMap::new(),
            listed: Vec::new(),
            sealed: false,
        }
    }

    /// Adds a ready segment. Returns how many segments joined the listed
    /// prefix (0 if the segment is waiting for an earlier one).
    pub fn add_segment(&mut self, segment: Segment) -> Result<usize> {
        let index = segment.chunk_index;
        if index >= self.total_chunks {
            return Err(VoxcastError::ChunkOutOfRange {
                index,
                total: self.total_chunks,
            });
        }
        if (index as usize) < self.listed.len() || self.pending.contains_key(&index) {
            return Err(VoxcastError::DuplicateChunk { index });
        }

        self.pending.insert(index, segment);

        let before = self.listed.len();
        while let Some(next) = self.pending.remove(&(self.listed.len() as u32)) {
            self.listed.push(next);
        }
        Ok(self.listed.len() - before)
    }

    /// Segments currently listed, in chunk order.
    pub fn segments(&self) -> &[Segment] {
        &self.listed
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Stops the playlist from growing; later renders are `VOD` with an end tag.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    /// True once every chunk is listed or the playlist was sealed.
    pub fn is_complete(&self) -> bool {
        self.sealed || self.listed.len() as u32 == self.total_chunks
    }

    /// Sum of listed segment durations.
    pub fn listed_duration(&self) -> f64 {
        self.listed.iter().map(|s| s.duration_seconds).sum()
    }

    /// `#EXT-X-TARGETDURATION`: the longest segment rounded up, at least 30s.
    pub fn target_duration(&self) -> u64 {
        let longest = self
            .listed
            .iter()
            .map(|s| s.duration_seconds)
            .fold(defaults::MIN_TARGET_DURATION_SECS, f64::max);
        longest.ceil() as u64
    }

    /// How often a client should re-fetch a growing playlist, in seconds.
    pub fn poll_interval_secs(&self) -> u64 {
        recommended_poll_interval(self.target_duration())
    }

    pub fn render(&self) -> String {
        let complete = self.is_complete();
        let mut lines = vec![
            "#EXTM3U".to_string(),
            "#EXT-X-VERSION:3".to_string(),
            format!("#EXT-X-TARGETDURATION:{}", self.target_duration()),
            "#EXT-X-MEDIA-SEQUENCE:0".to_string(),
            format!(
                "#EXT-X-PLAYLIST-TYPE:{}",
                if complete { "VOD" } else { "EVENT" }
            ),
            String::new(),
        ];

        for segment in &self.listed {
            lines.push(format!("#EXTINF:{:.3},", segment.duration_seconds));
            lines.push(segment.url.clone());
        }

        if complete {
            lines.push("#EXT-X-ENDLIST".to_string());
        }

        lines.join("\n")
    }

    /// Uploads the rendered playlist, replacing the previous one.
    pub async fn publish(&self, uploader: &dyn Uploader) -> Result<UploadReceipt> {
        let hints = UploadHints::new(
            manifest_key(&self.stream_id),
            defaults::MANIFEST_CONTENT_TYPE,
        );
        uploader.upload(self.render().into_bytes(), &hints).await
    }
}

/// `max(2, floor(target_duration / 2))`
pub fn recommended_poll_interval(target_duration: u64) -> u64 {
    (target_duration / 2).max(2)
}
