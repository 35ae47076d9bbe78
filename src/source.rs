use anyhow::{anyhow, bail, Context, Result};
use image::RgbImage;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use walkdir::WalkDir;

/// Supplies successive frames in playback order.
pub trait FrameSource {
    /// Next frame, or `Ok(None)` once the stream is exhausted.
    fn next_frame(&mut self) -> Result<Option<RgbImage>>;

    /// Dimensions of the frames before any resizing.
    fn native_size(&self) -> (u32, u32);
}

/// Options for video input
#[derive(Debug, Clone, Default)]
pub struct VideoOptions {
    /// Start time (e.g., "00:01:23.456" or "83.456")
    pub start: Option<String>,
    /// End time (e.g., "00:01:23.456" or "83.456")
    pub end: Option<String>,
}

impl VideoOptions {
    pub fn with_start(mut self, start: impl Into<String>) -> Self {
        self.start = Some(start.into());
        self
    }

    pub fn with_end(mut self, end: impl Into<String>) -> Self {
        self.end = Some(end.into());
        self
    }

    fn start(&self) -> Option<&str> {
        self.start.as_deref().map(str::trim).filter(|s| !s.is_empty() && *s != "0")
    }

    fn end(&self) -> Option<&str> {
        self.end.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

/// Stream metadata reported by ffprobe
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

/// Seconds from `SS`, `MM:SS` or `HH:MM:SS`, each part possibly fractional.
pub fn parse_timestamp(s: &str) -> Result<f64> {
    s.trim().split(':').rev().enumerate().try_fold(0.0, |acc, (i, v)| -> Result<f64> {
        let part: f64 = v
            .trim()
            .parse()
            .map_err(|_| anyhow!("invalid timestamp '{}'", s))?;
        Ok(acc + part * 60f64.powi(i as i32))
    })
}

/// Query ffprobe for the first video stream of `path`.
pub fn probe_video(path: &Path) -> Result<VideoInfo> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height,r_frame_rate",
            "-of",
            "default=noprint_wrappers=1",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .context("running ffprobe (is it installed and on PATH?)")?;

    if !output.status.success() {
        bail!("ffprobe could not read {}", path.display());
    }
    let info = parse_probe_output(&String::from_utf8_lossy(&output.stdout))
        .with_context(|| format!("no decodable video stream in {}", path.display()))?;
    log::info!(
        "probe_video: {}x{} @ {:.3}fps - {}",
        info.width,
        info.height,
        info.fps,
        path.display()
    );
    Ok(info)
}

fn parse_probe_output(text: &str) -> Result<VideoInfo> {
    let mut width: Option<u32> = None;
    let mut height: Option<u32> = None;
    let mut fps = 0.0;

    for line in text.lines() {
        if let Some(val) = line.strip_prefix("width=") {
            width = val.trim().parse().ok();
        } else if let Some(val) = line.strip_prefix("height=") {
            height = val.trim().parse().ok();
        } else if let Some(val) = line.strip_prefix("r_frame_rate=") {
            // "24/1", "30000/1001"
            let mut parts = val.trim().splitn(2, '/');
            let num: f64 = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0.0);
            let den: f64 = parts.next().and_then(|s| s.parse().ok()).unwrap_or(1.0);
            if den > 0.0 {
                fps = num / den;
            }
        }
    }

    match (width, height) {
        (Some(width), Some(height)) if width > 0 && height > 0 => Ok(VideoInfo { width, height, fps }),
        _ => Err(anyhow!("ffprobe reported no frame dimensions")),
    }
}

/// Arguments for an ffmpeg process that writes raw RGB24 frames to stdout.
///
/// Output geometry is pinned to the probed `width`x`height`: frames must arrive exactly as
/// large as the reader slices them, whatever rotation metadata the container carries.
fn ffmpeg_args(input: &Path, opts: &VideoOptions, info: &VideoInfo) -> Result<Vec<String>> {
    let mut args: Vec<String> = vec!["-hide_banner".into(), "-loglevel".into(), "error".into()];

    if let Some(s) = opts.start() {
        args.push("-ss".into());
        args.push(s.to_string());
    }

    args.push("-noautorotate".into());
    args.push("-i".into());
    args.push(
        input
            .to_str()
            .ok_or_else(|| anyhow!("video path is not valid UTF-8: {}", input.display()))?
            .to_string(),
    );

    if let Some(e) = opts.end() {
        let duration = match opts.start() {
            Some(s) => parse_timestamp(e)? - parse_timestamp(s)?,
            None => parse_timestamp(e)?,
        };
        if duration <= 0.0 {
            bail!("end time {} is not after start time", e);
        }
        args.push("-t".into());
        args.push(duration.to_string());
    }

    args.push("-vf".into());
    args.push(format!("scale={}:{}", info.width, info.height));

    for a in ["-f", "rawvideo", "-pix_fmt", "rgb24", "-an", "pipe:1"] {
        args.push(a.into());
    }
    Ok(args)
}

/// Fill `buf` from `reader`; `Ok(false)` when the stream ends first (a truncated trailing
/// frame counts as end of stream).
fn read_frame_bytes<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Video frames decoded by an `ffmpeg` child process.
pub struct VideoSource {
    path: PathBuf,
    info: VideoInfo,
    child: Child,
    stdout: Option<ChildStdout>,
    pending: Option<RgbImage>,
    frames_read: u64,
}

impl VideoSource {
    /// Probe `path` and start decoding it.
    ///
    /// The first frame is decoded before returning, so a file ffmpeg cannot decode fails
    /// here rather than partway into playback.
    pub fn open(path: &Path, opts: &VideoOptions) -> Result<Self> {
        if !path.is_file() {
            bail!("could not open video file {}", path.display());
        }
        let info = probe_video(path)?;
        let args = ffmpeg_args(path, opts, &info)?;
        Self::spawn(path, info, Command::new("ffmpeg").args(&args))
    }

    /// Start `decoder`, which must write `info`-sized RGB24 frames to stdout.
    fn spawn(path: &Path, info: VideoInfo, decoder: &mut Command) -> Result<Self> {
        let mut child = decoder
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| {
                format!("running {} (is it installed and on PATH?)", decoder.get_program().to_string_lossy())
            })?;
        log::debug!("decoder spawned: {:?}", decoder);

        let stdout = child.stdout.take().context("decoder stdout was not captured")?;
        let mut source = Self {
            path: path.to_path_buf(),
            info,
            child,
            stdout: Some(stdout),
            pending: None,
            frames_read: 0,
        };
        source.pending = source.read_frame()?;
        Ok(source)
    }

    pub fn info(&self) -> VideoInfo {
        self.info
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    fn read_frame(&mut self) -> Result<Option<RgbImage>> {
        let Some(stdout) = self.stdout.as_mut() else {
            return Ok(None);
        };

        let (w, h) = (self.info.width, self.info.height);
        let mut buf = vec![0u8; w as usize * h as usize * 3];
        if !read_frame_bytes(stdout, &mut buf).context("reading frame from ffmpeg")? {
            log::info!("end of video after {} frames", self.frames_read);
            self.finish()?;
            return Ok(None);
        }

        self.frames_read += 1;
        let frame = RgbImage::from_raw(w, h, buf).ok_or_else(|| anyhow!("frame buffer does not match {}x{}", w, h))?;
        Ok(Some(frame))
    }

    fn finish(&mut self) -> Result<()> {
        self.stdout = None;
        let status = self.child.wait().context("waiting for ffmpeg")?;
        if !status.success() {
            if self.frames_read == 0 {
                bail!("ffmpeg failed to decode {} ({})", self.path.display(), status);
            }
            log::warn!(
                "ffmpeg exited with {} after {} frames of {}",
                status,
                self.frames_read,
                self.path.display()
            );
        }
        Ok(())
    }
}

impl FrameSource for VideoSource {
    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        match self.pending.take() {
            Some(frame) => Ok(Some(frame)),
            None => self.read_frame(),
        }
    }

    fn native_size(&self) -> (u32, u32) {
        (self.info.width, self.info.height)
    }
}

impl Drop for VideoSource {
    fn drop(&mut self) {
        if self.stdout.take().is_some() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

/// Still images in a directory, played in file name order.
pub struct ImageSequence {
    frames: Vec<PathBuf>,
    next: usize,
    native: (u32, u32),
}

impl ImageSequence {
    pub fn open(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            bail!("frame directory {} does not exist", dir.display());
        }
        let mut frames: Vec<PathBuf> = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| e.into_path())
            .filter(|p| p.is_file() && is_image(p))
            .collect();
        frames.sort();

        let first = frames
            .first()
            .ok_or_else(|| anyhow!("no png/jpg frames found in {}", dir.display()))?;
        let native = image::image_dimensions(first).with_context(|| format!("reading {}", first.display()))?;
        log::info!("image sequence: {} frames, {}x{} - {}", frames.len(), native.0, native.1, dir.display());

        Ok(Self { frames, next: 0, native })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

fn is_image(p: &Path) -> bool {
    p.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| matches!(e.to_ascii_lowercase().as_str(), "png" | "jpg" | "jpeg"))
}

impl FrameSource for ImageSequence {
    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        let Some(path) = self.frames.get(self.next) else {
            return Ok(None);
        };
        self.next += 1;
        let img = image::open(path).with_context(|| format!("opening {}", path.display()))?;
        Ok(Some(img.to_rgb8()))
    }

    fn native_size(&self) -> (u32, u32) {
        self.native
    }
}

/// Open a directory as an image sequence, anything else as a video.
pub fn open_source(input: &Path, opts: &VideoOptions) -> Result<Box<dyn FrameSource>> {
    if input.is_dir() {
        if opts.start().is_some() || opts.end().is_some() {
            log::warn!("start/end times are ignored for image directories");
        }
        Ok(Box::new(ImageSequence::open(input)?))
    } else {
        Ok(Box::new(VideoSource::open(input, opts)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use std::io::Cursor;

    #[test]
    fn timestamps() {
        assert_eq!(parse_timestamp("83.5").unwrap(), 83.5);
        assert_eq!(parse_timestamp("01:23.5").unwrap(), 83.5);
        assert_eq!(parse_timestamp("1:00:00").unwrap(), 3600.0);
        assert!(parse_timestamp("abc").is_err());
    }

    #[test]
    fn probe_output_parsing() {
        let info = parse_probe_output("width=480\nheight=360\nr_frame_rate=30000/1001\n").unwrap();
        assert_eq!((info.width, info.height), (480, 360));
        assert!((info.fps - 29.97).abs() < 0.01);

        assert!(parse_probe_output("").is_err());
        assert!(parse_probe_output("width=0\nheight=360\n").is_err());
    }

    const INFO: VideoInfo = VideoInfo { width: 480, height: 360, fps: 30.0 };

    #[test]
    fn ffmpeg_args_plain() {
        let args = ffmpeg_args(Path::new("clip.avi"), &VideoOptions::default(), &INFO).unwrap();
        assert!(!args.contains(&"-ss".to_string()));
        assert!(!args.contains(&"-t".to_string()));
        let i = args.iter().position(|a| a == "-i").unwrap();
        assert_eq!(args[i + 1], "clip.avi");
        assert_eq!(args[args.len() - 3..], ["rgb24", "-an", "pipe:1"]);
    }

    #[test]
    fn ffmpeg_args_with_range() {
        let opts = VideoOptions::default().with_start("00:00:10").with_end("25");
        let args = ffmpeg_args(Path::new("clip.avi"), &opts, &INFO).unwrap();
        let ss = args.iter().position(|a| a == "-ss").unwrap();
        let i = args.iter().position(|a| a == "-i").unwrap();
        assert!(ss < i, "-ss must come before -i for fast seeking");
        assert_eq!(args[ss + 1], "00:00:10");
        let t = args.iter().position(|a| a == "-t").unwrap();
        assert_eq!(args[t + 1], "15");
    }

    #[test]
    fn ffmpeg_args_zero_start_is_ignored() {
        let opts = VideoOptions::default().with_start("0").with_end("4");
        let args = ffmpeg_args(Path::new("clip.avi"), &opts, &INFO).unwrap();
        assert!(!args.contains(&"-ss".to_string()));
        let t = args.iter().position(|a| a == "-t").unwrap();
        assert_eq!(args[t + 1], "4");
    }

    #[test]
    fn ffmpeg_args_rejects_backwards_range() {
        let opts = VideoOptions::default().with_start("10").with_end("5");
        assert!(ffmpeg_args(Path::new("clip.avi"), &opts, &INFO).is_err());
    }

    #[test]
    fn ffmpeg_output_geometry_is_pinned_to_probe() {
        // Rotation metadata must not swap the frame layout under the reader.
        let args = ffmpeg_args(Path::new("portrait.mp4"), &VideoOptions::default(), &INFO).unwrap();
        let noauto = args.iter().position(|a| a == "-noautorotate").unwrap();
        let i = args.iter().position(|a| a == "-i").unwrap();
        assert!(noauto < i, "-noautorotate is an input option");
        let vf = args.iter().position(|a| a == "-vf").unwrap();
        assert_eq!(args[vf + 1], "scale=480:360");
        assert!(vf > i);
    }

    #[test]
    fn frame_bytes_handle_short_reads() {
        let mut reader = Cursor::new(vec![1u8, 2, 3, 4, 5]);
        let mut buf = [0u8; 3];
        assert!(read_frame_bytes(&mut reader, &mut buf).unwrap());
        assert_eq!(buf, [1, 2, 3]);
        assert!(!read_frame_bytes(&mut reader, &mut buf).unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn decoder_failure_surfaces_at_open() {
        let info = VideoInfo { width: 2, height: 1, fps: 25.0 };
        let err = VideoSource::spawn(Path::new("broken.avi"), info, Command::new("sh").args(["-c", "exit 1"]))
            .err()
            .unwrap();
        assert!(err.to_string().contains("failed to decode"), "{err:#}");
    }

    #[cfg(unix)]
    #[test]
    fn first_frame_is_buffered_at_open() {
        let info = VideoInfo { width: 2, height: 1, fps: 25.0 };
        let mut decoder = Command::new("printf");
        decoder.arg("\\377\\377\\377\\000\\000\\000");
        let mut source = VideoSource::spawn(Path::new("tiny.avi"), info, &mut decoder).unwrap();
        assert_eq!(source.frames_read(), 1);
        let frame = source.next_frame().unwrap().unwrap();
        assert_eq!(frame.get_pixel(0, 0), &Rgb([255, 255, 255]));
        assert_eq!(frame.get_pixel(1, 0), &Rgb([0, 0, 0]));
        assert!(source.next_frame().unwrap().is_none());
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn missing_video_is_a_startup_error() {
        let err = VideoSource::open(Path::new("definitely/not/here.avi"), &VideoOptions::default())
            .err()
            .unwrap();
        assert!(err.to_string().contains("could not open video file"));
    }

    #[test]
    fn image_sequence_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        RgbImage::from_pixel(3, 2, Rgb([255, 255, 255])).save(dir.path().join("frame_0002.png")).unwrap();
        RgbImage::from_pixel(3, 2, Rgb([0, 0, 0])).save(dir.path().join("frame_0001.png")).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut seq = ImageSequence::open(dir.path()).unwrap();
        assert_eq!(seq.len(), 2);
        assert_eq!(seq.native_size(), (3, 2));
        assert_eq!(seq.next_frame().unwrap().unwrap().get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(seq.next_frame().unwrap().unwrap().get_pixel(0, 0), &Rgb([255, 255, 255]));
        assert!(seq.next_frame().unwrap().is_none());
        assert!(seq.next_frame().unwrap().is_none());
    }

    #[test]
    fn empty_directory_is_a_startup_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ImageSequence::open(dir.path()).is_err());
        assert!(open_source(dir.path(), &VideoOptions::default()).is_err());
    }
}
