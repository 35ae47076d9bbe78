use anyhow::{anyhow, Result};
use serde::{Deserialize, Deserializer};

/// One brightness band: every value strictly below `upper` (and not claimed by an
/// earlier band) maps to `symbol`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Band {
    pub upper: i32,
    pub symbol: char,
}

impl From<(i32, char)> for Band {
    fn from((upper, symbol): (i32, char)) -> Self {
        Self { upper, symbol }
    }
}

/// Ordered brightness → symbol table.
///
/// Bands are checked in ascending order and the first one whose upper bound is
/// strictly greater than the input wins. Anything at or above the last bound maps
/// to `brightest`.
///
/// # Example
///
/// ```
/// use notecast::Palette;
///
/// let palette = Palette::default();
/// assert_eq!(palette.quantize(0), '.');
/// assert_eq!(palette.quantize(128), '+');
/// assert_eq!(palette.quantize(255), '@');
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    bands: Vec<Band>,
    brightest: char,
}

impl Palette {
    /// Build a palette from explicit bands. Upper bounds must be strictly increasing.
    pub fn new<I, B>(bands: I, brightest: char) -> Result<Self>
    where
        I: IntoIterator<Item = B>,
        B: Into<Band>,
    {
        let bands: Vec<Band> = bands.into_iter().map(Into::into).collect();
        if let Some(pair) = bands.windows(2).find(|w| w[0].upper >= w[1].upper) {
            return Err(anyhow!(
                "palette thresholds must be strictly increasing ({} is followed by {})",
                pair[0].upper,
                pair[1].upper
            ));
        }
        Ok(Self { bands, brightest })
    }

    /// Build an evenly spaced palette from a darkest-to-brightest character ramp.
    ///
    /// A ramp of `n` characters splits `[0, 256)` into `n` equal bands, so
    /// `".-+@"` yields the default 64/128/192 table.
    pub fn from_ramp(ramp: &str) -> Result<Self> {
        let chars: Vec<char> = ramp.chars().collect();
        let n = chars.len();
        if n < 2 {
            return Err(anyhow!("palette ramp needs at least 2 characters, got {}", n));
        }
        if n > 256 {
            return Err(anyhow!("palette ramp has {} characters, at most 256 are distinguishable", n));
        }
        let bands = chars[..n - 1]
            .iter()
            .enumerate()
            .map(|(k, &symbol)| Band { upper: ((k + 1) * 256 / n) as i32, symbol });
        Self::new(bands, chars[n - 1])
    }

    /// Map a brightness value to its symbol. Defined for every `i32`.
    #[inline]
    pub fn quantize(&self, brightness: i32) -> char {
        self.bands
            .iter()
            .find(|band| brightness < band.upper)
            .map_or(self.brightest, |band| band.symbol)
    }

    /// Symbol used for grid positions with no source pixel (the darkest band).
    pub fn background(&self) -> char {
        self.bands.first().map_or(self.brightest, |band| band.symbol)
    }

    pub fn bands(&self) -> &[Band] {
        &self.bands
    }

    pub fn brightest(&self) -> char {
        self.brightest
    }

    /// Number of distinct symbols, including the catch-all.
    pub fn levels(&self) -> usize {
        self.bands.len() + 1
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            bands: vec![
                Band { upper: 64, symbol: '.' },
                Band { upper: 128, symbol: '-' },
                Band { upper: 192, symbol: '+' },
            ],
            brightest: '@',
        }
    }
}

/// Config file shape: either an explicit table or a ramp string.
#[derive(Deserialize)]
#[serde(untagged)]
enum PaletteSpec {
    Table { bands: Vec<(i32, char)>, brightest: char },
    Ramp { ramp: String },
}

impl<'de> Deserialize<'de> for Palette {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let built = match PaletteSpec::deserialize(deserializer)? {
            PaletteSpec::Table { bands, brightest } => Palette::new(bands, brightest),
            PaletteSpec::Ramp { ramp } => Palette::from_ramp(&ramp),
        };
        built.map_err(serde::de::Error::custom)
    }
}
