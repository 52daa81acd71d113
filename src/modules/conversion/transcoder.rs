use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::process::Command;
use tracing::{info, warn};

const AUDIO_BITRATE: &str = "192000";

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("unsupported audio codec: {0:?}")]
    UnsupportedCodec(String),
    #[error("ffmpeg exited with status {0}")]
    FfmpegFailed(std::process::ExitStatus),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Output policy per detected source codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioCodec {
    Aac,
    Mp3,
    Wav,
}

impl AudioCodec {
    pub fn from_probe(codec: &str) -> Option<Self> {
        match codec {
            "aac" => Some(AudioCodec::Aac),
            "mp3" => Some(AudioCodec::Mp3),
            "wav" => Some(AudioCodec::Wav),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            AudioCodec::Aac => "aac",
            AudioCodec::Mp3 => "mp3",
            AudioCodec::Wav => "wav",
        }
    }

    pub fn ffmpeg_args(self) -> &'static [&'static str] {
        match self {
            // AAC streams are copied as-is into an ADTS container
            AudioCodec::Aac => &["-acodec", "copy", "-f", "adts"],
            AudioCodec::Mp3 => &["-acodec", "libmp3lame", "-q:a", "2", "-f", "mp3"],
            AudioCodec::Wav => &["-acodec", "pcm_s16le", "-f", "wav"],
        }
    }
}

/// MIME type for a produced audio file, keyed by extension.
pub fn mime_type(extension: &str) -> &'static str {
    match extension {
        "aac" => "audio/aac",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        _ => "application/octet-stream",
    }
}

/// Extracts the audio codec name from ffmpeg's diagnostic output.
pub fn parse_audio_codec(probe_output: &str) -> Option<String> {
    for line in probe_output.lines() {
        if let Some((_, rest)) = line.split_once("Audio: ") {
            return rest
                .split_whitespace()
                .next()
                .map(|token| token.trim_end_matches(',').to_string());
        }
    }
    None
}

/// External transcoder capability.
#[async_trait]
pub trait Transcode: Send + Sync {
    /// Materializes `video` as `file_name` inside `work_dir`, converts it,
    /// and returns the path of the produced audio file. The input file is
    /// removed unconditionally; the output file belongs to the caller.
    async fn transcode(
        &self,
        work_dir: &Path,
        file_name: &str,
        video: Bytes,
    ) -> Result<PathBuf, TranscodeError>;
}

pub struct FfmpegTranscoder {
    ffmpeg_path: String,
}

impl FfmpegTranscoder {
    pub fn new(ffmpeg_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }

    async fn probe(&self, input: &Path) -> Result<String, TranscodeError> {
        // `ffmpeg -i` with no output file exits non-zero; only the stream
        // info on stderr matters here. kill_on_drop so a cancelled job
        // deadline does not leave the child behind.
        let output = Command::new(&self.ffmpeg_path)
            .arg("-i")
            .arg(input)
            .kill_on_drop(true)
            .output()
            .await?;

        let text = String::from_utf8_lossy(&output.stderr);
        Ok(parse_audio_codec(&text).unwrap_or_default())
    }

    async fn run(&self, input: &Path) -> Result<PathBuf, TranscodeError> {
        let codec_name = self.probe(input).await?;
        let codec = AudioCodec::from_probe(&codec_name)
            .ok_or(TranscodeError::UnsupportedCodec(codec_name))?;

        let output = input.with_extension(codec.extension());

        info!(
            codec = ?codec,
            output = %output.display(),
            "transcoding {}",
            input.display()
        );

        let status = Command::new(&self.ffmpeg_path)
            .arg("-i")
            .arg(input)
            .args(["-vn", "-y", "-ab", AUDIO_BITRATE])
            .args(codec.ffmpeg_args())
            .arg(&output)
            .kill_on_drop(true)
            .status()
            .await?;

        if !status.success() {
            return Err(TranscodeError::FfmpegFailed(status));
        }

        Ok(output)
    }
}

#[async_trait]
impl Transcode for FfmpegTranscoder {
    async fn transcode(
        &self,
        work_dir: &Path,
        file_name: &str,
        video: Bytes,
    ) -> Result<PathBuf, TranscodeError> {
        let input_path = work_dir.join(file_name);
        tokio::fs::write(&input_path, &video).await?;

        let result = self.run(&input_path).await;

        // The input is only needed for the ffmpeg run
        if let Err(err) = tokio::fs::remove_file(&input_path).await {
            warn!("failed to remove input file {}: {err}", input_path.display());
        }

        result
    }
}
