use anyhow::{Context, Result};
use image::RgbImage;
use std::time::{Duration, Instant};

use crate::{DisplaySink, FrameSource, GridSize, Pacer, Renderer, ResizeFilter};

/// Summary of a finished playback
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackStats {
    /// Frames delivered to the sink
    pub frames: u64,
    pub elapsed: Duration,
}

impl PlaybackStats {
    pub fn average_fps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.frames as f64 / secs
        } else {
            0.0
        }
    }
}

/// Scale `frame` to exactly the grid dimensions. Frames that already match are
/// returned untouched.
pub fn resize_to_grid(frame: RgbImage, grid: GridSize, filter: ResizeFilter) -> RgbImage {
    if frame.dimensions() == (grid.width, grid.height) || frame.width() == 0 || frame.height() == 0 {
        return frame;
    }
    image::imageops::resize(&frame, grid.width, grid.height, filter.into())
}

/// Pull every frame from `source`, render it and hand it to `sink`, pacing
/// deliveries with `pacer`.
///
/// Runs until the source reports end of stream, which is a normal return.
/// `on_frame` is called with the running frame count after each delivery.
pub fn play<S, D, F>(
    source: &mut S,
    sink: &mut D,
    renderer: &Renderer,
    filter: ResizeFilter,
    pacer: &mut Pacer,
    mut on_frame: F,
) -> Result<PlaybackStats>
where
    S: FrameSource + ?Sized,
    D: DisplaySink + ?Sized,
    F: FnMut(u64),
{
    let grid = renderer.grid();
    let (native_w, native_h) = source.native_size();
    log::info!(
        "playing {}x{} frames on a {}x{} grid, {:?} per frame",
        native_w,
        native_h,
        grid.width,
        grid.height,
        pacer.interval()
    );

    let started = Instant::now();
    let mut frames: u64 = 0;
    let mut text = String::new();
    pacer.reset();

    while let Some(frame) = source.next_frame().with_context(|| format!("reading frame {}", frames + 1))? {
        let frame = resize_to_grid(frame, grid, filter);
        renderer.render_into(&frame, &mut text);
        sink.show(&text).with_context(|| format!("displaying frame {}", frames + 1))?;
        frames += 1;
        on_frame(frames);
        pacer.wait();
    }

    let stats = PlaybackStats { frames, elapsed: started.elapsed() };
    log::info!(
        "end of stream after {} frames ({:.1} fps average)",
        stats.frames,
        stats.average_fps()
    );
    Ok(stats)
}
