use std::{cmp::Reverse, collections::HashSet};

use serde::Serialize;
use tracing::{debug, warn};

use crate::{
    error::FormatsError,
    extractor::{MediaExtractor, RawFormat},
    links::{normalize_video_url, parse_http_url},
};

/// Video-only streams below this height are not offered.
const MIN_MERGE_HEIGHT: u32 = 720;
const BYTES_PER_MB: f64 = 1_048_576.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatKind {
    Video,
    VideoMerge,
    Audio,
}

impl FormatKind {
    pub fn is_video_like(self) -> bool {
        matches!(self, Self::Video | Self::VideoMerge)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormatDescriptor {
    pub format_id: String,
    pub name: String,
    pub resolution: String,
    #[serde(rename = "type")]
    pub kind: FormatKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

#[derive(Debug, PartialEq, Eq, Hash)]
enum DedupKey<'a> {
    Resolution(&'a str),
    Kind(FormatKind),
}

impl FormatDescriptor {
    fn dedup_key(&self) -> DedupKey<'_> {
        if self.kind.is_video_like() {
            DedupKey::Resolution(&self.resolution)
        } else {
            DedupKey::Kind(self.kind)
        }
    }
}

pub fn default_formats() -> Vec<FormatDescriptor> {
    vec![
        FormatDescriptor {
            format_id: "best".to_string(),
            name: "Best Quality (Auto)".to_string(),
            resolution: "best".to_string(),
            kind: FormatKind::Video,
            height: None,
        },
        FormatDescriptor {
            format_id: "mp3".to_string(),
            name: "MP3 Audio (128kbps)".to_string(),
            resolution: "audio".to_string(),
            kind: FormatKind::Audio,
            height: None,
        },
    ]
}

pub async fn list_formats(
    extractor: &dyn MediaExtractor,
    cookies: Option<&std::path::Path>,
    url: &str,
) -> Vec<FormatDescriptor> {
    match try_list_formats(extractor, cookies, url).await {
        Ok(formats) => formats,
        Err(error) => {
            warn!("could not list formats for {url:?}, using defaults: {error}");
            default_formats()
        }
    }
}

async fn try_list_formats(
    extractor: &dyn MediaExtractor,
    cookies: Option<&std::path::Path>,
    url: &str,
) -> Result<Vec<FormatDescriptor>, FormatsError> {
    let url = normalize_video_url(url);
    if parse_http_url(&url).is_none() {
        return Err(FormatsError::InvalidUrl(url));
    }

    let info = extractor.fetch_info(&url, cookies).await?;
    Ok(build_format_list(&info.formats))
}

pub fn build_format_list(raw_formats: &[RawFormat]) -> Vec<FormatDescriptor> {
    let mut candidates = default_formats();
    candidates.extend(raw_formats.iter().filter_map(describe));

    let mut seen = HashSet::new();
    let mut unique = Vec::with_capacity(candidates.len());
    for candidate in &candidates {
        if seen.insert(candidate.dedup_key()) {
            unique.push(candidate.clone());
        } else {
            debug!(
                "dropping duplicate format {} ({})",
                candidate.format_id, candidate.resolution
            );
        }
    }

    let (mut video, other): (Vec<_>, Vec<_>) = unique
        .into_iter()
        .partition(|format| format.kind.is_video_like());
    video.sort_by_key(|format| Reverse(format.height.unwrap_or_default()));

    other.into_iter().chain(video).collect()
}

fn describe(raw: &RawFormat) -> Option<FormatDescriptor> {
    let Some(height) = raw.height else {
        debug!("dropping format {}: no height", raw.format_id);
        return None;
    };
    if !raw.has_video() {
        debug!("dropping format {}: no video track", raw.format_id);
        return None;
    }

    let (format_id, kind, mut name) = if raw.has_audio() {
        (raw.format_id.clone(), FormatKind::Video, format!("{height}p"))
    } else if height >= MIN_MERGE_HEIGHT {
        (
            format!("{}+bestaudio", raw.format_id),
            FormatKind::VideoMerge,
            format!("{height}p (Video Only)"),
        )
    } else {
        debug!(
            "dropping format {}: video-only below {MIN_MERGE_HEIGHT}p",
            raw.format_id
        );
        return None;
    };

    if let Some(fps) = raw.fps.filter(|fps| *fps > 0.0) {
        name.push_str(&format!(" ({}fps)", fps.trunc() as u32));
    }
    if let Some(bytes) = raw.byte_size() {
        name.push_str(&format!(" ({:.1}MB)", bytes / BYTES_PER_MB));
    }

    Some(FormatDescriptor {
        format_id,
        name,
        resolution: format!("{height}p"),
        kind,
        height: Some(height),
    })
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use async_trait::async_trait;

    use super::*;
    use crate::{
        error::ExtractorError,
        extractor::{DownloadJob, VideoInfo},
    };

    fn combined(id: &str, height: u32) -> RawFormat {
        RawFormat {
            format_id: id.to_string(),
            video_ext: Some("mp4".to_string()),
            audio_ext: Some("m4a".to_string()),
            height: Some(height),
            ..RawFormat::default()
        }
    }

    fn video_only(id: &str, height: u32) -> RawFormat {
        RawFormat {
            audio_ext: Some("none".to_string()),
            ..combined(id, height)
        }
    }

    fn audio_only(id: &str) -> RawFormat {
        RawFormat {
            format_id: id.to_string(),
            video_ext: Some("none".to_string()),
            audio_ext: Some("m4a".to_string()),
            ..RawFormat::default()
        }
    }

    fn ids(formats: &[FormatDescriptor]) -> Vec<&str> {
        formats.iter().map(|f| f.format_id.as_str()).collect()
    }

    #[test]
    fn audio_first_then_video_by_descending_height() {
        let formats = build_format_list(&[
            combined("18", 480),
            video_only("137", 1080),
            video_only("136", 720),
        ]);

        assert_eq!(
            ids(&formats),
            ["mp3", "137+bestaudio", "136+bestaudio", "18", "best"]
        );
        let heights: Vec<_> = formats.iter().map(|f| f.height).collect();
        assert_eq!(heights, [None, Some(1080), Some(720), Some(480), None]);
    }

    #[test]
    fn first_entry_per_resolution_wins() {
        let formats = build_format_list(&[
            combined("22", 1080),
            video_only("137", 1080),
            video_only("248", 1080),
        ]);

        let at_1080: Vec<_> = formats
            .iter()
            .filter(|f| f.resolution == "1080p")
            .collect();
        assert_eq!(at_1080.len(), 1);
        assert_eq!(at_1080[0].format_id, "22");
        assert_eq!(at_1080[0].kind, FormatKind::Video);
    }

    #[test]
    fn unusable_entries_are_dropped() {
        let no_height = RawFormat {
            height: None,
            ..combined("sb0", 0)
        };
        let formats = build_format_list(&[
            no_height,
            audio_only("140"),
            video_only("135", 480),
            video_only("160", 144),
        ]);

        assert_eq!(formats, default_formats().into_iter().rev().collect::<Vec<_>>());
    }

    #[test]
    fn labels_truncate_fps_and_show_size() {
        let mut raw = video_only("299", 1080);
        raw.fps = Some(59.94);
        raw.filesize = Some(157_286_400.0);
        raw.filesize_approx = Some(1.0);

        let mut plain = combined("18", 360);
        plain.fps = Some(0.0);
        plain.filesize_approx = Some(5_452_595.0);

        let formats = build_format_list(&[raw, plain]);
        let merge = formats.iter().find(|f| f.format_id == "299+bestaudio").unwrap();
        assert_eq!(merge.name, "1080p (Video Only) (59fps) (150.0MB)");
        assert_eq!(merge.kind, FormatKind::VideoMerge);

        let low = formats.iter().find(|f| f.format_id == "18").unwrap();
        assert_eq!(low.name, "360p (5.2MB)");
    }

    #[test]
    fn serializes_kind_as_type_and_skips_missing_height() {
        let json = serde_json::to_value(build_format_list(&[video_only("137", 1080)])).unwrap();
        assert_eq!(
            json,
            serde_json::json!([
                {"format_id": "mp3", "name": "MP3 Audio (128kbps)", "resolution": "audio", "type": "audio"},
                {"format_id": "137+bestaudio", "name": "1080p (Video Only)", "resolution": "1080p",
                 "type": "video_merge", "height": 1080},
                {"format_id": "best", "name": "Best Quality (Auto)", "resolution": "best", "type": "video"}
            ])
        );
    }

    struct Scripted {
        info: fn() -> Result<VideoInfo, ExtractorError>,
        seen_url: std::sync::Mutex<Option<String>>,
    }

    #[async_trait]
    impl MediaExtractor for Scripted {
        async fn fetch_info(
            &self,
            url: &str,
            _cookies: Option<&Path>,
        ) -> Result<VideoInfo, ExtractorError> {
            *self.seen_url.lock().unwrap() = Some(url.to_string());
            (self.info)()
        }

        async fn download(&self, _job: &DownloadJob) -> Result<Option<PathBuf>, ExtractorError> {
            unreachable!("listing never downloads")
        }
    }

    #[tokio::test]
    async fn failure_returns_exactly_the_defaults() {
        let extractor = Scripted {
            info: || Err(ExtractorError::Failed("ERROR: Video unavailable".to_string())),
            seen_url: Default::default(),
        };
        let formats = list_formats(&extractor, None, "https://youtu.be/x").await;
        assert_eq!(ids(&formats), ["best", "mp3"]);
        assert_eq!(formats, default_formats());
    }

    #[tokio::test]
    async fn shorts_urls_are_normalized_before_lookup() {
        let extractor = Scripted {
            info: || {
                Ok(VideoInfo {
                    formats: vec![combined("18", 360)],
                })
            },
            seen_url: Default::default(),
        };
        let formats =
            list_formats(&extractor, None, "https://www.youtube.com/shorts/abc?si=1").await;

        assert_eq!(ids(&formats), ["mp3", "18", "best"]);
        assert_eq!(
            extractor.seen_url.lock().unwrap().as_deref(),
            Some("https://www.youtube.com/watch?v=abc")
        );
    }

    #[tokio::test]
    async fn invalid_url_skips_the_extractor() {
        let extractor = Scripted {
            info: || Ok(VideoInfo::default()),
            seen_url: Default::default(),
        };
        let formats = list_formats(&extractor, None, "--exec=id").await;
        assert_eq!(formats, default_formats());
        assert!(extractor.seen_url.lock().unwrap().is_none());
    }
}
