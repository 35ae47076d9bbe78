use anyhow::{bail, Context, Result};
use crossterm::cursor::MoveTo;
use crossterm::style::Print;
use crossterm::terminal::{self, Clear, ClearType};
use crossterm::queue;
use std::fs;
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};

use crate::GridSize;

/// A text surface whose whole contents are replaced by each frame.
pub trait DisplaySink {
    /// Replace the displayed text with `text`. Returns once the surface holds it.
    fn show(&mut self, text: &str) -> Result<()>;
}

impl<T: DisplaySink + ?Sized> DisplaySink for Box<T> {
    fn show(&mut self, text: &str) -> Result<()> {
        (**self).show(text)
    }
}

/// Draws frames over each other at the top-left of the terminal.
pub struct TerminalSink {
    out: io::Stdout,
    cleared: bool,
}

impl TerminalSink {
    /// Fails when stdout is not a terminal.
    pub fn attach() -> Result<Self> {
        let out = io::stdout();
        if !out.is_terminal() {
            bail!("no terminal found on stdout");
        }
        log::info!("attached to terminal");
        Ok(Self { out, cleared: false })
    }

    /// Whether a block of `grid` fits on screen without scrolling.
    pub fn fits(&self, grid: GridSize) -> bool {
        match terminal::size() {
            // The final row separator moves the cursor one line further down.
            Ok((cols, rows)) => u32::from(cols) >= grid.width && u32::from(rows) > grid.height,
            Err(e) => {
                log::debug!("terminal size unavailable: {e}");
                true
            }
        }
    }
}

impl DisplaySink for TerminalSink {
    fn show(&mut self, text: &str) -> Result<()> {
        let mut out = self.out.lock();
        if !self.cleared {
            queue!(out, Clear(ClearType::All))?;
            self.cleared = true;
        }
        queue!(out, MoveTo(0, 0), Print(text))?;
        out.flush().context("writing frame to terminal")?;
        Ok(())
    }
}

/// Keeps a text file holding the latest frame.
///
/// Each frame is written to a sibling temp file and renamed over the target, so
/// readers never observe a half-written frame.
pub struct FileSink {
    path: PathBuf,
    tmp: PathBuf,
}

impl FileSink {
    /// Fails when the file's directory does not exist.
    pub fn attach(path: &Path) -> Result<Self> {
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        if !dir.is_dir() {
            bail!("display directory {} not found", dir.display());
        }
        let name = path
            .file_name()
            .and_then(|s| s.to_str())
            .with_context(|| format!("display path {} has no file name", path.display()))?;
        let tmp = dir.join(format!(".{}.notecast-tmp", name));
        log::info!("writing frames to {}", path.display());
        Ok(Self { path: path.to_path_buf(), tmp })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DisplaySink for FileSink {
    fn show(&mut self, text: &str) -> Result<()> {
        fs::write(&self.tmp, text).with_context(|| format!("writing {}", self.tmp.display()))?;
        fs::rename(&self.tmp, &self.path).with_context(|| format!("replacing {}", self.path.display()))?;
        Ok(())
    }
}

impl Drop for FileSink {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.tmp);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_sink_replaces_contents() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("screen.txt");
        let mut sink = FileSink::attach(&target).unwrap();

        sink.show("..\n..\n").unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "..\n..\n");
        sink.show("@\n").unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "@\n");

        drop(sink);
        let leftovers: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(leftovers.len(), 1, "temp file left behind");
    }

    #[test]
    fn file_sink_requires_existing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("missing").join("screen.txt");
        assert!(FileSink::attach(&target).is_err());
    }

    #[test]
    fn boxed_sink_forwards() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("screen.txt");
        let mut sink: Box<dyn DisplaySink> = Box::new(FileSink::attach(&target).unwrap());
        sink.show("+\n").unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "+\n");
    }
}
