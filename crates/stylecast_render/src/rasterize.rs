use std::path::Path;
use tracing::debug;

use crate::error::{RenderError, Result};

// ---------------------------------------------------------------------------
// Rasterizer
// ---------------------------------------------------------------------------

/// Renders an HTML document to a transparent PNG at an exact pixel size.
/// The production implementation shells out to a headless browser; tests
/// install a fake.
pub trait Rasterizer {
    fn render_png(&self, html: &str, width: u32, height: u32, out: &Path) -> Result<()>;
}

/// Wraps a container snippet and the project's stylesheet into a standalone
/// document pinned to the output size with a transparent background.
pub fn container_shell(html: &str, css: &str, width: u32, height: u32) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<style>\n\
         html, body {{ margin: 0; padding: 0; width: {width}px; height: {height}px; \
         background: transparent; overflow: hidden; }}\n\
         {css}\n</style>\n</head>\n<body>{html}</body>\n</html>\n"
    )
}

// ---------------------------------------------------------------------------
// ChromiumRasterizer
// ---------------------------------------------------------------------------

/// Screenshots the document with headless Chromium. The HTML is staged next
/// to the target PNG and removed afterwards.
pub struct ChromiumRasterizer {
    pub binary: String,
}

impl Default for ChromiumRasterizer {
    fn default() -> Self {
        Self {
            binary: "chromium".to_string(),
        }
    }
}

impl Rasterizer for ChromiumRasterizer {
    fn render_png(&self, html: &str, width: u32, height: u32, out: &Path) -> Result<()> {
        let html_path = out.with_extension("html");
        std::fs::write(&html_path, html).map_err(|source| RenderError::CacheIo {
            path: html_path.clone(),
            source,
        })?;

        debug!(out = %out.display(), width, height, "rasterizing container");
        let status = std::process::Command::new(&self.binary)
            .args([
                "--headless",
                "--disable-gpu",
                "--hide-scrollbars",
                "--default-background-color=00000000",
                &format!("--screenshot={}", out.display()),
                &format!("--window-size={width},{height}"),
                &format!("file://{}", html_path.display()),
            ])
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status();

        let _ = std::fs::remove_file(&html_path);

        let status = status.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RenderError::RasterizerNotInstalled(self.binary.clone())
            } else {
                RenderError::Io(e)
            }
        })?;

        if !status.success() {
            return Err(RenderError::RasterizerFailed(format!(
                "{} exited with {status}",
                self.binary
            )));
        }
        if !out.exists() {
            return Err(RenderError::RasterizerFailed(format!(
                "no screenshot produced at {}",
                out.display()
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
