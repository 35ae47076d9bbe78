use anyhow::Result;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use notecast::{
    open_source, play, AppConfig, DisplaySink, FileSink, LineEnding, Pacer, Palette, ResizeFilter, TerminalSink,
    VideoOptions,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

/// Display surface missing, or lost during playback.
const EXIT_DISPLAY: u8 = 1;
/// Bad configuration or arguments.
const EXIT_CONFIG: u8 = 2;
/// Frame source could not be opened (the `-1` of a signed exit status).
const EXIT_SOURCE: u8 = 255;

#[derive(Parser, Debug)]
#[command(version, about = "Play a video as animated ASCII art in a text surface.")]
struct Args {
    /// Video file or directory of image frames [default: bad_apple.avi]
    input: Option<PathBuf>,

    /// Write frames into this file instead of the terminal
    #[arg(long, value_name = "PATH")]
    file: Option<PathBuf>,

    /// Grid columns
    #[arg(long)]
    width: Option<u32>,

    /// Grid rows
    #[arg(long)]
    height: Option<u32>,

    /// Target delay between frames in milliseconds (0 = as fast as possible)
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Character ramp from darkest to brightest, split into even bands
    #[arg(long)]
    ramp: Option<String>,

    /// Row separator
    #[arg(long, value_enum)]
    line_ending: Option<LineEnding>,

    /// Resampling filter used to fit frames onto the grid
    #[arg(long, value_enum)]
    filter: Option<ResizeFilter>,

    /// Start time for video playback (e.g., 00:01:23.456 or 83.456)
    #[arg(long)]
    start: Option<String>,

    /// End time for video playback (e.g., 00:01:23.456 or 83.456)
    #[arg(long)]
    end: Option<String>,

    /// Configuration file [default: notecast.json in the app data dir or current dir]
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log level: off, error, warn, info, debug, trace
    #[arg(long, default_value = "warn")]
    log_level: log::LevelFilter,

    /// Hide the frame counter shown when writing to a file
    #[arg(long, default_value_t = false)]
    no_progress: bool,
}

fn load_config(args: &Args) -> Result<AppConfig> {
    let mut cfg = match &args.config {
        Some(p) => AppConfig::from_file(p)?,
        None => AppConfig::discover()?,
    };

    if let Some(w) = args.width {
        cfg.width = w;
    }
    if let Some(h) = args.height {
        cfg.height = h;
    }
    if let Some(ms) = args.interval_ms {
        cfg.frame_interval_ms = ms;
    }
    if let Some(ramp) = &args.ramp {
        cfg.palette = Palette::from_ramp(ramp)?;
    }
    if let Some(le) = args.line_ending {
        cfg.line_ending = le;
    }
    if let Some(f) = args.filter {
        cfg.filter = f;
    }
    cfg.validate()?;
    Ok(cfg)
}

fn fail(code: u8, err: anyhow::Error) -> ExitCode {
    log::error!("{:#}", err);
    eprintln!("Error: {:#}", err);
    ExitCode::from(code)
}

fn frame_counter() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {pos} frames ({per_sec})")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn main() -> ExitCode {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(args.log_level)
        .init();

    let cfg = match load_config(&args) {
        Ok(cfg) => cfg,
        Err(e) => return fail(EXIT_CONFIG, e),
    };
    let renderer = match cfg.renderer() {
        Ok(r) => r,
        Err(e) => return fail(EXIT_CONFIG, e),
    };

    // Source first, then the display surface.
    let input = args.input.clone().unwrap_or_else(|| cfg.default_input.clone());
    let video_opts = VideoOptions { start: args.start.clone(), end: args.end.clone() };
    let mut source = match open_source(&input, &video_opts) {
        Ok(s) => s,
        Err(e) => return fail(EXIT_SOURCE, e.context("could not open video file")),
    };

    let mut sink: Box<dyn DisplaySink> = match &args.file {
        Some(path) => match FileSink::attach(path) {
            Ok(s) => Box::new(s),
            Err(e) => return fail(EXIT_DISPLAY, e),
        },
        None => match TerminalSink::attach() {
            Ok(s) => {
                if !s.fits(renderer.grid()) {
                    log::warn!(
                        "terminal is smaller than the {}x{} grid, frames will scroll",
                        renderer.grid().width,
                        renderer.grid().height
                    );
                }
                Box::new(s)
            }
            Err(e) => return fail(EXIT_DISPLAY, e.context("no display surface found (use --file to write to a file)")),
        },
    };

    // The terminal sink owns the screen; only count frames when writing to a file.
    let progress = (args.file.is_some() && !args.no_progress).then(frame_counter);
    if progress.is_none() {
        eprintln!("Processing video and sending frames to the display...");
    }

    let mut pacer = Pacer::new(cfg.frame_interval());
    let result = play(source.as_mut(), sink.as_mut(), &renderer, cfg.filter, &mut pacer, |n| {
        if let Some(pb) = &progress {
            pb.set_position(n);
        }
    });

    if let Some(pb) = progress {
        pb.finish_and_clear();
    }

    match result {
        Ok(stats) => {
            eprintln!("End of video reached ({} frames).", stats.frames);
            ExitCode::SUCCESS
        }
        Err(e) => fail(EXIT_DISPLAY, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn args_with_config(json: &str, extra: &[&str]) -> (Args, tempfile::NamedTempFile) {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(json.as_bytes()).unwrap();
        let mut argv = vec!["notecast".to_string(), "--config".to_string(), f.path().display().to_string()];
        argv.extend(extra.iter().map(|a| a.to_string()));
        (Args::parse_from(argv), f)
    }

    #[test]
    fn config_file_values_apply() {
        let (args, _f) = args_with_config(r#"{"width": 80, "height": 30, "line_ending": "crlf"}"#, &[]);
        let cfg = load_config(&args).unwrap();
        assert_eq!((cfg.width, cfg.height), (80, 30));
        assert_eq!(cfg.line_ending, LineEnding::CrLf);
        assert_eq!(cfg.palette.levels(), 4);
    }

    #[test]
    fn flags_override_config() {
        let (args, _f) = args_with_config(
            r#"{"width": 80, "height": 30, "frame_interval_ms": 40, "filter": "nearest"}"#,
            &["--width", "40", "--ramp", " #", "--interval-ms", "0", "--line-ending", "crlf", "--filter", "lanczos3"],
        );
        let cfg = load_config(&args).unwrap();
        assert_eq!(cfg.width, 40);
        assert_eq!(cfg.height, 30, "unset flags keep the file's value");
        assert_eq!(cfg.palette.levels(), 2);
        assert_eq!(cfg.frame_interval(), Duration::ZERO);
        assert_eq!(cfg.line_ending, LineEnding::CrLf);
        assert_eq!(cfg.filter, ResizeFilter::Lanczos3);
    }

    #[test]
    fn invalid_overrides_are_config_errors() {
        let (args, _f) = args_with_config(r#"{"width": 80}"#, &["--width", "0"]);
        assert!(load_config(&args).is_err());

        let (args, _f) = args_with_config("{}", &["--ramp", "#"]);
        assert!(load_config(&args).is_err());
    }

    #[test]
    fn unknown_log_level_is_rejected() {
        let err = Args::try_parse_from(["notecast", "--log-level", "loud"]).unwrap_err();
        assert_eq!(err.exit_code(), i32::from(EXIT_CONFIG));

        let args = Args::try_parse_from(["notecast", "--log-level", "debug"]).unwrap();
        assert_eq!(args.log_level, log::LevelFilter::Debug);
        assert_eq!(Args::parse_from(["notecast"]).log_level, log::LevelFilter::Warn);
    }
}
