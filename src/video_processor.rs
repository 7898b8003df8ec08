//! # Video Processing Module
//!
//! Questo modulo ri-codifica una clip in modo che il peso stimato rientri nel budget.
//!
//! ## Responsabilità:
//! - Analisi proprietà video con ffprobe (durata, risoluzione, codec)
//! - Calcolo analitico del bitrate target: niente loop, un encode video costa troppo
//! - Policy pre-encode: downscale oltre 1920px, audio sempre rimosso
//! - Un'unica invocazione di ffmpeg per clip, senza retry
//! - Misura dell'output e segnalazione esplicita degli sforamenti
//!
//! ## Formula del bitrate:
//! ```text
//! bitrate (bps)  = target (bit) × margine / durata (s)
//! bitrate (kbps) = floor(bps / 1000)
//! ```
//! Il margine (default 0.9) assorbe overhead del container e varianza dell'encoder.
//! È una costante regolabile, non un valore derivato.
//!
//! ## Parametri ffmpeg (contratto con i player, iOS/QuickTime inclusi):
//! - `-c:v h264_nvenc -profile:v high`
//! - `-b:v Nk -maxrate Nk -bufsize 2Nk`
//! - `-preset p7 -rc vbr -pix_fmt yuv420p`
//! - `-movflags +faststart` (opzionale)
//!
//! ## Stati di un job:
//! `Loaded → BitrateComputed → (ResizeApplied) → AudioStripped → Encoding →
//! {Succeeded | SucceededOverBudget | Failed}`
//!
//! Durata zero o illeggibile è un errore del singolo item, mai una divisione per zero.
//!
//! ## Dipendenze richieste:
//! - `ffmpeg`: encoding
//! - `ffprobe`: analisi durata/risoluzione

use crate::artifact::{MediaArtifact, OutcomeRecord};
use crate::config::{Config, SizeBudget};
use crate::error::OptimizeError;
use crate::platform::PlatformCommands;
use crate::size_probe::SizeProbe;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Video file information
#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    pub codec: String,
}

/// Reads clip properties
pub trait MediaProbe: Send + Sync {
    fn probe(&self, path: &Path) -> Result<VideoInfo, OptimizeError>;
}

/// Runs one encode job to completion
pub trait VideoEncoder: Send + Sync {
    fn encode(&self, job: &EncodeJob) -> Result<(), OptimizeError>;
}

/// `ffprobe -print_format json` backed probe
pub struct FfprobeProbe;

impl FfprobeProbe {
    /// Parses ffprobe's JSON. Missing fields become zero, which the transcoder rejects.
    pub fn parse(json: &str) -> Result<VideoInfo, OptimizeError> {
        let info: serde_json::Value = serde_json::from_str(json)?;

        let format = &info["format"];
        let duration = format["duration"]
            .as_str()
            .and_then(|d| d.parse::<f64>().ok())
            .unwrap_or(0.0);

        let video_stream = info["streams"]
            .as_array()
            .and_then(|streams| streams.iter().find(|s| s["codec_type"] == "video"))
            .ok_or_else(|| OptimizeError::Probe("No video stream found".to_string()))?;

        let width = video_stream["width"].as_u64().unwrap_or(0) as u32;
        let height = video_stream["height"].as_u64().unwrap_or(0) as u32;
        let codec = video_stream["codec_name"]
            .as_str()
            .unwrap_or("unknown")
            .to_string();

        Ok(VideoInfo {
            duration,
            width,
            height,
            codec,
        })
    }
}

impl MediaProbe for FfprobeProbe {
    fn probe(&self, path: &Path) -> Result<VideoInfo, OptimizeError> {
        let ffprobe = PlatformCommands::instance().resolve("ffprobe");

        let output = Command::new(&ffprobe)
            .args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
            .arg(path)
            .output()
            .map_err(|e| {
                OptimizeError::Probe(format!("Failed to execute {}: {}", ffprobe.display(), e))
            })?;

        if !output.status.success() {
            return Err(OptimizeError::Probe(
                String::from_utf8_lossy(&output.stderr).to_string(),
            ));
        }

        Self::parse(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Invokes ffmpeg synchronously; its exit status is the job's result.
pub struct FfmpegEncoder;

impl VideoEncoder for FfmpegEncoder {
    fn encode(&self, job: &EncodeJob) -> Result<(), OptimizeError> {
        let ffmpeg = PlatformCommands::instance().resolve("ffmpeg");

        let mut cmd = Command::new(&ffmpeg);
        cmd.args(["-y", "-hide_banner", "-loglevel", "error", "-i"])
            .arg(&job.input)
            .args(job.ffmpeg_args())
            .arg(&job.output);

        info!(
            "Encoding {} at {}k with {}...",
            job.input.file_name().unwrap_or_default().to_string_lossy(),
            job.target_bitrate_kbps,
            job.codec
        );
        let start_time = std::time::Instant::now();

        let output = cmd.output().map_err(|e| {
            OptimizeError::FFmpeg(format!("Failed to execute {}: {}", ffmpeg.display(), e))
        })?;

        if !output.status.success() {
            return Err(OptimizeError::FFmpeg(
                String::from_utf8_lossy(&output.stderr).to_string(),
            ));
        }

        debug!("Encode finished in {:.1}s", start_time.elapsed().as_secs_f64());
        Ok(())
    }
}

/// Target bitrate in kbps: `floor(target_bytes * 8 * margin / duration / 1000)`.
pub fn target_bitrate_kbps(
    target_bytes: u64,
    safety_margin: f64,
    duration_secs: f64,
) -> Result<u32, OptimizeError> {
    if !(duration_secs.is_finite() && duration_secs > 0.0) {
        return Err(OptimizeError::InvalidDuration(format!(
            "duration is {}, cannot derive a bitrate",
            duration_secs
        )));
    }

    let target_bits = target_bytes as f64 * 8.0;
    let bps = target_bits * safety_margin / duration_secs;
    let kbps = (bps / 1000.0) as u32;

    if kbps == 0 {
        return Err(OptimizeError::InvalidDuration(format!(
            "{:.2}s is too long for a {} byte budget",
            duration_secs, target_bytes
        )));
    }

    Ok(kbps)
}

/// Encoder-facing settings, taken from `Config`
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderSettings {
    pub codec: String,
    pub profile: String,
    pub preset: String,
    pub max_width: u32,
    pub safety_margin: f64,
    pub faststart: bool,
}

impl From<&Config> for EncoderSettings {
    fn from(config: &Config) -> Self {
        Self {
            codec: config.video_codec.clone(),
            profile: config.video_profile.clone(),
            preset: config.video_preset.clone(),
            max_width: config.max_video_width,
            safety_margin: config.bitrate_safety_margin,
            faststart: config.faststart,
        }
    }
}

/// One fully planned encode
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeJob {
    pub input: PathBuf,
    pub output: PathBuf,
    pub duration_secs: f64,
    pub width: u32,
    pub height: u32,
    pub target_bitrate_kbps: u32,
    pub strip_audio: bool,
    /// Downscale to this width, height following proportionally
    pub resize_to_width: Option<u32>,
    pub codec: String,
    pub profile: String,
    pub preset: String,
    pub faststart: bool,
}

impl EncodeJob {
    /// Encoder options placed between `-i <input>` and the output path
    pub fn ffmpeg_args(&self) -> Vec<String> {
        let kbps = self.target_bitrate_kbps;
        let mut args = Vec::new();

        if self.strip_audio {
            args.push("-an".to_string());
        }
        if let Some(width) = self.resize_to_width {
            // -2 keeps the height even, as yuv420p requires
            args.extend(crate::args!["-vf", format!("scale={}:-2", width)]);
        }

        args.extend(crate::args![
            "-c:v",
            self.codec,
            "-profile:v",
            self.profile,
            "-b:v",
            format!("{}k", kbps),
            "-maxrate",
            format!("{}k", kbps),
            "-bufsize",
            format!("{}k", u64::from(kbps) * 2),
            "-preset",
            self.preset,
            "-rc",
            "vbr",
            "-pix_fmt",
            "yuv420p",
        ]);

        if self.faststart {
            args.extend(crate::args!["-movflags", "+faststart"]);
        }

        args
    }
}

/// Per-job state. Terminal states are mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStage {
    Loaded,
    BitrateComputed,
    ResizeApplied,
    AudioStripped,
    Encoding,
    Succeeded,
    SucceededOverBudget,
    Failed,
}

/// Bitrate-targeted clip transcoder
pub struct VideoBitrateTranscoder {
    budget: SizeBudget,
    settings: EncoderSettings,
    probe: Arc<dyn MediaProbe>,
    encoder: Arc<dyn VideoEncoder>,
}

impl VideoBitrateTranscoder {
    pub fn new(
        config: &Config,
        probe: Arc<dyn MediaProbe>,
        encoder: Arc<dyn VideoEncoder>,
    ) -> Result<Self, OptimizeError> {
        Ok(Self {
            budget: config.video_budget()?,
            settings: EncoderSettings::from(config),
            probe,
            encoder,
        })
    }

    pub fn budget(&self) -> SizeBudget {
        self.budget
    }

    /// Probes the clip and applies the pre-encode policies, without encoding.
    pub fn plan(&self, source: &MediaArtifact, output: &Path) -> Result<EncodeJob, OptimizeError> {
        let name = source.file_name();

        if !source.path().exists() {
            return Err(OptimizeError::SourceNotFound(source.path().display().to_string()));
        }

        let info = self.probe.probe(source.path())?;
        Self::trace(&name, JobStage::Loaded);
        info!("{}: duration {:.2}s, {}x{} {}", name, info.duration, info.width, info.height, info.codec);

        let kbps = target_bitrate_kbps(
            self.budget.target(),
            self.settings.safety_margin,
            info.duration,
        )?;
        Self::trace(&name, JobStage::BitrateComputed);
        info!(
            "{}: target bitrate {}k for < {:.2}MB",
            name,
            kbps,
            SizeProbe::to_mb(self.budget.target())
        );

        let resize_to_width = if info.width > self.settings.max_width {
            info!("{}: resizing from {}px to {}px", name, info.width, self.settings.max_width);
            Self::trace(&name, JobStage::ResizeApplied);
            Some(self.settings.max_width)
        } else {
            None
        };

        Self::trace(&name, JobStage::AudioStripped);

        Ok(EncodeJob {
            input: source.path().to_path_buf(),
            output: output.to_path_buf(),
            duration_secs: info.duration,
            width: info.width,
            height: info.height,
            target_bitrate_kbps: kbps,
            strip_audio: true,
            resize_to_width,
            codec: self.settings.codec.clone(),
            profile: self.settings.profile.clone(),
            preset: self.settings.preset.clone(),
            faststart: self.settings.faststart,
        })
    }

    /// Plans, encodes once and re-measures. Every failure becomes `Failed`.
    pub fn transcode(&self, source: &MediaArtifact, output: &Path) -> OutcomeRecord {
        let name = source.file_name();

        match self.try_transcode(source, output) {
            Ok(outcome) => {
                if let OutcomeRecord::Overshoot { final_size, target, .. } = outcome {
                    Self::trace(&name, JobStage::SucceededOverBudget);
                    warn!(
                        "{}: output is {:.2}MB, above the {:.2}MB target",
                        name,
                        SizeProbe::to_mb(final_size),
                        SizeProbe::to_mb(target)
                    );
                } else {
                    Self::trace(&name, JobStage::Succeeded);
                }
                outcome
            }
            Err(e) => {
                Self::trace(&name, JobStage::Failed);
                OutcomeRecord::failed(source.path(), e)
            }
        }
    }

    fn try_transcode(
        &self,
        source: &MediaArtifact,
        output: &Path,
    ) -> Result<OutcomeRecord, OptimizeError> {
        let original_size = source.size().unwrap_or_default();
        let job = self.plan(source, output)?;

        Self::trace(&source.file_name(), JobStage::Encoding);
        self.encoder.encode(&job)?;

        let final_size = SizeProbe::bytes(output)?;
        Ok(OutcomeRecord::completed(
            source.path(),
            original_size,
            final_size,
            output,
            self.budget.target(),
        ))
    }

    fn trace(name: &str, stage: JobStage) {
        debug!("{}: {:?}", name, stage);
    }
}
