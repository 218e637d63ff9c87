//! FFprobe stream information.

use std::path::Path;
use std::process::Stdio;

use serde::Deserialize;
use tokio::process::Command;

use super::error::{MediaError, MediaResult};

/// The subset of stream information the pipeline needs.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaInfo {
    pub width: u32,
    pub height: u32,
    /// Container duration in seconds.
    pub duration: f64,
}

impl MediaInfo {
    pub fn resolution(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

pub async fn probe(path: &Path) -> MediaResult<MediaInfo> {
    let ffprobe = which::which("ffprobe").map_err(|_| MediaError::BinaryNotFound("ffprobe"))?;

    let output = Command::new(ffprobe)
        .args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::ProbeFailed(format!(
            "{} (status {:?}): {}",
            path.display(),
            output.status.code(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    parse_probe_output(&output.stdout, path)
}

fn parse_probe_output(stdout: &[u8], path: &Path) -> MediaResult<MediaInfo> {
    let probe: FfprobeOutput = serde_json::from_slice(stdout)?;

    let video = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| MediaError::NoVideoStream(path.to_path_buf()))?;

    let duration = probe
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
        .unwrap_or(0.0);

    Ok(MediaInfo {
        width: video.width.unwrap_or(0),
        height: video.height.unwrap_or(0),
        duration,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_the_first_video_stream() {
        let json = br#"{
            "streams": [
                {"codec_type": "audio", "sample_rate": "48000"},
                {"codec_type": "video", "width": 1920, "height": 1080}
            ],
            "format": {"duration": "60.040000", "size": "1024"}
        }"#;

        let info = parse_probe_output(json, Path::new("clip.mp4")).unwrap();
        assert_eq!(info, MediaInfo { width: 1920, height: 1080, duration: 60.04 });
        assert_eq!(info.resolution(), "1920x1080");
    }

    #[test]
    fn missing_duration_defaults_to_zero() {
        let json = br#"{"streams": [{"codec_type": "video", "width": 640, "height": 360}], "format": {}}"#;
        let info = parse_probe_output(json, Path::new("clip.webm")).unwrap();
        assert_eq!(info.duration, 0.0);
    }

    #[test]
    fn audio_only_sources_are_rejected() {
        let json = br#"{"streams": [{"codec_type": "audio"}], "format": {"duration": "3.0"}}"#;
        let err = parse_probe_output(json, Path::new("song.mp3")).unwrap_err();
        assert!(matches!(err, MediaError::NoVideoStream(_)));
    }
}
