//! # notecast - ASCII video playback into a text surface
//!
//! `notecast` decodes a video, turns every frame into a fixed grid of characters chosen
//! by pixel brightness, and keeps replacing the text of a display surface with the
//! latest frame, producing an animated ASCII-art effect.
//!
//! ## Features
//!
//! - Data-driven brightness palettes (explicit thresholds or evenly spaced ramps)
//! - Frame rendering with per-position bounds handling
//! - Video input through `ffmpeg`, or a directory of image frames
//! - Terminal and file display surfaces
//! - Drift-free frame pacing
//!
//! ## Example
//!
//! ```
//! use image::{Rgb, RgbImage};
//!
//! let frame = RgbImage::from_pixel(2, 1, Rgb([255, 255, 255]));
//! assert_eq!(notecast::render(&frame, 3, 1), "@@.\n");
//! ```
//!
//! ## Playback
//!
//! ```no_run
//! use notecast::{play, open_source, Pacer, Renderer, TerminalSink, VideoOptions};
//! use notecast::{GridSize, ResizeFilter};
//! use std::path::Path;
//! use std::time::Duration;
//!
//! # fn main() -> anyhow::Result<()> {
//! let mut source = open_source(Path::new("bad_apple.avi"), &VideoOptions::default())?;
//! let mut sink = TerminalSink::attach()?;
//! let renderer = Renderer::new(GridSize::new(250, 100)?);
//! let mut pacer = Pacer::new(Duration::from_millis(16));
//! let stats = play(source.as_mut(), &mut sink, &renderer, ResizeFilter::Triangle, &mut pacer, |_| {})?;
//! println!("{} frames", stats.frames);
//! # Ok(())
//! # }
//! ```

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub mod pacing;
pub mod palette;
pub mod player;
pub mod render;
pub mod sink;
pub mod source;

pub use pacing::Pacer;
pub use palette::{Band, Palette};
pub use player::{play, resize_to_grid, PlaybackStats};
pub use render::{luminance, render, Renderer};
pub use sink::{DisplaySink, FileSink, TerminalSink};
pub use source::{open_source, parse_timestamp, probe_video, FrameSource, ImageSequence, VideoInfo, VideoOptions, VideoSource};

/// Fixed number of columns and rows sampled from every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridSize {
    pub width: u32,
    pub height: u32,
}

impl GridSize {
    /// Both dimensions must be positive.
    pub fn new(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(anyhow!("grid dimensions must be positive, got {}x{}", width, height));
        }
        Ok(Self { width, height })
    }
}

impl Default for GridSize {
    fn default() -> Self {
        Self { width: 250, height: 100 }
    }
}

/// Row separator written after every rendered row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LineEnding {
    /// `\n`
    #[default]
    Lf,
    /// `\r\n`, needed by some edit controls
    #[value(name = "crlf")]
    CrLf,
}

impl LineEnding {
    pub fn as_str(&self) -> &'static str {
        match self {
            LineEnding::Lf => "\n",
            LineEnding::CrLf => "\r\n",
        }
    }
}

/// Resampling filter used to fit source frames onto the grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ResizeFilter {
    Nearest,
    /// Bilinear
    #[default]
    Triangle,
    CatmullRom,
    Gaussian,
    Lanczos3,
}

impl From<ResizeFilter> for image::imageops::FilterType {
    fn from(filter: ResizeFilter) -> Self {
        use image::imageops::FilterType;
        match filter {
            ResizeFilter::Nearest => FilterType::Nearest,
            ResizeFilter::Triangle => FilterType::Triangle,
            ResizeFilter::CatmullRom => FilterType::CatmullRom,
            ResizeFilter::Gaussian => FilterType::Gaussian,
            ResizeFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

fn default_width() -> u32 {
    250
}

fn default_height() -> u32 {
    100
}

fn default_frame_interval_ms() -> u64 {
    16
}

fn default_input() -> PathBuf {
    PathBuf::from("bad_apple.avi")
}

/// Application configuration, read from `notecast.json`
#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    /// Target delay between frames; 0 disables pacing
    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,
    #[serde(default)]
    pub palette: Palette,
    #[serde(default)]
    pub line_ending: LineEnding,
    #[serde(default)]
    pub filter: ResizeFilter,
    /// Video played when no input is given on the command line
    #[serde(default = "default_input")]
    pub default_input: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            frame_interval_ms: default_frame_interval_ms(),
            palette: Palette::default(),
            line_ending: LineEnding::default(),
            filter: ResizeFilter::default(),
            default_input: default_input(),
        }
    }
}

impl AppConfig {
    /// Load and validate a configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
        let config: AppConfig =
            serde_json::from_str(&text).with_context(|| format!("parsing config json {}", path.display()))?;
        config.validate().with_context(|| format!("invalid config {}", path.display()))?;
        Ok(config)
    }

    /// Search the usual locations: app data dir, then the current directory.
    /// Falls back to built-in defaults when neither exists.
    pub fn discover() -> Result<Self> {
        for p in Self::search_paths() {
            if p.exists() {
                log::info!("using config {}", p.display());
                return Self::from_file(&p);
            }
        }
        Ok(Self::default())
    }

    pub fn search_paths() -> Vec<PathBuf> {
        let mut tried: Vec<PathBuf> = Vec::new();
        if let Some(mut d) = dirs::data_dir() {
            d.push("notecast");
            d.push("notecast.json");
            tried.push(d);
        }
        tried.push(PathBuf::from("notecast.json"));
        tried
    }

    pub fn validate(&self) -> Result<()> {
        self.grid().map(|_| ())
    }

    pub fn grid(&self) -> Result<GridSize> {
        GridSize::new(self.width, self.height)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    /// Renderer built from this configuration
    pub fn renderer(&self) -> Result<Renderer> {
        Ok(Renderer::new(self.grid()?)
            .with_palette(self.palette.clone())
            .with_line_ending(self.line_ending))
    }
}
