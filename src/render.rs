use image::{Rgb, RgbImage};

use crate::{GridSize, LineEnding, Palette};

/// Perceived brightness of an RGB sample, ITU-R BT.601 weights.
///
/// Integer math with coefficients scaled by 1000 (299 + 587 + 114 = 1000), which is
/// the exact truncation of `0.299*R + 0.587*G + 0.114*B`. The maximum is 255.
#[inline]
pub fn luminance(rgb: Rgb<u8>) -> u8 {
    let r = rgb[0] as u32;
    let g = rgb[1] as u32;
    let b = rgb[2] as u32;
    ((299 * r + 587 * g + 114 * b) / 1000) as u8
}

/// Turns source images into fixed-size text blocks.
///
/// # Example
///
/// ```
/// use image::{Rgb, RgbImage};
/// use notecast::{GridSize, Renderer};
///
/// let renderer = Renderer::new(GridSize::new(2, 2).unwrap());
/// let black = RgbImage::from_pixel(2, 2, Rgb([0, 0, 0]));
/// assert_eq!(renderer.render(&black), "..\n..\n");
/// ```
#[derive(Debug, Clone)]
pub struct Renderer {
    grid: GridSize,
    palette: Palette,
    line_ending: LineEnding,
}

impl Renderer {
    pub fn new(grid: GridSize) -> Self {
        Self {
            grid,
            palette: Palette::default(),
            line_ending: LineEnding::default(),
        }
    }

    pub fn with_palette(mut self, palette: Palette) -> Self {
        self.palette = palette;
        self
    }

    pub fn with_line_ending(mut self, line_ending: LineEnding) -> Self {
        self.line_ending = line_ending;
        self
    }

    pub fn grid(&self) -> GridSize {
        self.grid
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    pub fn line_ending(&self) -> LineEnding {
        self.line_ending
    }

    /// Render `frame` into a new text block.
    pub fn render(&self, frame: &RgbImage) -> String {
        let mut out = String::new();
        self.render_into(frame, &mut out);
        out
    }

    /// Render `frame` into `out`, replacing its contents.
    ///
    /// Produces exactly `grid.height` rows of `grid.width` symbols, each row followed by
    /// the line ending (the last one included). Grid positions outside the frame get the
    /// palette's background symbol; the frame is not required to match the grid.
    pub fn render_into(&self, frame: &RgbImage, out: &mut String) {
        let (w, h) = (self.grid.width, self.grid.height);
        let (frame_w, frame_h) = frame.dimensions();
        let background = self.palette.background();
        let sep = self.line_ending.as_str();

        out.clear();
        out.reserve((w as usize + sep.len()) * h as usize);
        for y in 0..h {
            for x in 0..w {
                if x < frame_w && y < frame_h {
                    let l = luminance(*frame.get_pixel(x, y));
                    out.push(self.palette.quantize(i32::from(l)));
                } else {
                    out.push(background);
                }
            }
            out.push_str(sep);
        }
    }
}

/// Render with the default palette and `\n` separators.
///
/// A zero width yields `grid_height` empty rows; a zero height yields an empty string.
pub fn render(frame: &RgbImage, grid_width: u32, grid_height: u32) -> String {
    let grid = GridSize { width: grid_width, height: grid_height };
    Renderer::new(grid).render(frame)
}
