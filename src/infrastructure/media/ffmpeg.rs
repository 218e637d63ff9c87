//! FFmpeg command builder and runner.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::debug;

use super::encoding::EncodingPlan;
use super::error::{MediaError, MediaResult};
use super::probe::{self, MediaInfo};
use super::toolkit::{MediaToolkit, ProgressFn};

const STDERR_TAIL_LINES: usize = 20;

const THUMBNAIL_SCALE: &str = "scale=320:180";
const X264_OPTS: &str = "keyint=240:min-keyint=120:ref=1:bframes=2:me=hex:subme=4:trellis=0:weightb=0:mixed-refs=0:8x8dct=0:fast-pskip=1";

#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    input: PathBuf,
    output: PathBuf,
    /// Placed before `-i`.
    input_args: Vec<String>,
    output_args: Vec<String>,
}

impl FfmpegCommand {
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            input_args: Vec::new(),
            output_args: Vec::new(),
        }
    }

    pub fn input_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.input_args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn build_args(&self) -> Vec<String> {
        let mut args: Vec<String> = ["-y", "-v", "error", "-progress", "pipe:2"]
            .into_iter()
            .map(String::from)
            .collect();

        args.extend(self.input_args.iter().cloned());
        args.push("-i".to_string());
        args.push(self.input.to_string_lossy().to_string());
        args.extend(self.output_args.iter().cloned());
        args.push(self.output.to_string_lossy().to_string());

        args
    }

    /// Runs the command, reporting each `-progress` block to `on_progress`.
    pub async fn run<F>(&self, on_progress: F) -> MediaResult<()>
    where
        F: Fn(&FfmpegProgress) + Send,
    {
        let ffmpeg = which::which("ffmpeg").map_err(|_| MediaError::BinaryNotFound("ffmpeg"))?;
        let args = self.build_args();
        debug!("Running ffmpeg {}", args.join(" "));

        let mut child = Command::new(ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| std::io::Error::other("ffmpeg stderr was not captured"))?;
        let mut lines = BufReader::new(stderr).lines();

        let mut current = FfmpegProgress::default();
        let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);

        while let Some(line) = lines.next_line().await? {
            match parse_progress_line(&line, &mut current) {
                ProgressLine::Snapshot => on_progress(&current),
                ProgressLine::Field => {}
                ProgressLine::Other => {
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
            }
        }

        let status = child.wait().await?;
        if status.success() {
            Ok(())
        } else {
            Err(MediaError::FfmpegFailed {
                code: status.code(),
                stderr: Vec::from(tail).join("\n"),
            })
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FfmpegProgress {
    /// Output timestamp reached so far, in microseconds.
    pub out_time_us: i64,
    pub is_complete: bool,
}

impl FfmpegProgress {
    /// Share of `total_secs` already encoded, clamped to `0..=100`.
    pub fn percentage(&self, total_secs: f64) -> Option<f64> {
        if self.is_complete {
            return Some(100.0);
        }
        if total_secs.is_nan() || total_secs <= 0.0 {
            return None;
        }
        let done = self.out_time_us as f64 / 1_000_000.0;
        Some((done / total_secs * 100.0).clamp(0.0, 100.0))
    }
}

#[derive(Debug, PartialEq, Eq)]
enum ProgressLine {
    /// End of a progress block (`progress=continue|end`).
    Snapshot,
    Field,
    /// Anything that is not `key=value`, usually an error message.
    Other,
}

fn parse_progress_line(line: &str, current: &mut FfmpegProgress) -> ProgressLine {
    let Some((key, value)) = line.trim().split_once('=') else {
        return ProgressLine::Other;
    };
    if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return ProgressLine::Other;
    }

    match key {
        // ffmpeg reports both in microseconds despite the name.
        "out_time_us" | "out_time_ms" => {
            if let Ok(us) = value.trim().parse::<i64>() {
                current.out_time_us = us.max(0);
            }
            ProgressLine::Field
        }
        "progress" => {
            current.is_complete = value.trim() == "end";
            ProgressLine::Snapshot
        }
        _ => ProgressLine::Field,
    }
}

/// Local ffmpeg/ffprobe binaries.
#[derive(Debug, Clone)]
pub struct Ffmpeg {
    preset: String,
    threads: u32,
}

impl Ffmpeg {
    pub fn new(preset: impl Into<String>, threads: u32) -> Self {
        Self {
            preset: preset.into(),
            threads,
        }
    }

    pub fn transcode_command(&self, input: &Path, output: &Path, plan: &EncodingPlan) -> FfmpegCommand {
        FfmpegCommand::new(input, output).output_args([
            "-c:v".to_string(),
            "libx264".to_string(),
            "-b:v".to_string(),
            format!("{}k", plan.bitrate_kbps),
            "-c:a".to_string(),
            "aac".to_string(),
            "-b:a".to_string(),
            "64k".to_string(),
            "-crf".to_string(),
            plan.crf.to_string(),
            "-movflags".to_string(),
            "+faststart".to_string(),
            "-tune".to_string(),
            "film".to_string(),
            "-threads".to_string(),
            self.threads.to_string(),
            "-preset".to_string(),
            self.preset.clone(),
            "-profile:v".to_string(),
            "high".to_string(),
            "-level".to_string(),
            "4.1".to_string(),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
            "-avoid_negative_ts".to_string(),
            "make_zero".to_string(),
            "-fflags".to_string(),
            "+genpts".to_string(),
            "-x264opts".to_string(),
            X264_OPTS.to_string(),
            "-maxrate".to_string(),
            format!("{}k", plan.maxrate_kbps),
            "-bufsize".to_string(),
            format!("{}k", plan.bufsize_kbps),
            "-g".to_string(),
            "240".to_string(),
            "-bf".to_string(),
            "2".to_string(),
            "-qmin".to_string(),
            "18".to_string(),
            "-qmax".to_string(),
            "40".to_string(),
            "-qdiff".to_string(),
            "15".to_string(),
            "-flags".to_string(),
            "-cgop".to_string(),
            "-sc_threshold".to_string(),
            "0".to_string(),
        ])
    }

    pub fn thumbnail_command(&self, input: &Path, output: &Path, at_seconds: f64) -> FfmpegCommand {
        FfmpegCommand::new(input, output)
            .input_args(["-ss".to_string(), format!("{:.3}", at_seconds)])
            .output_args(["-frames:v", "1", "-vf", THUMBNAIL_SCALE, "-c:v", "libwebp"])
    }
}

#[async_trait]
impl MediaToolkit for Ffmpeg {
    async fn probe(&self, path: &Path) -> MediaResult<MediaInfo> {
        probe::probe(path).await
    }

    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        plan: &EncodingPlan,
        duration_secs: f64,
        on_progress: ProgressFn,
    ) -> MediaResult<()> {
        self.transcode_command(input, output, plan)
            .run(|progress| {
                if let Some(percent) = progress.percentage(duration_secs) {
                    on_progress(percent);
                }
            })
            .await
    }

    async fn thumbnail(&self, input: &Path, output: &Path, at_seconds: f64) -> MediaResult<()> {
        self.thumbnail_command(input, output, at_seconds).run(|_| {}).await
    }
}
