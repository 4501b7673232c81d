//! ==============================================================================
//! camera.rs - still capture via the system camera utility
//! ==============================================================================
//!
//! purpose:
//!     takes one photo at a given size into a given file. the actual sensor
//!     work is done by libcamera-still; we only build the command line and
//!     report whether it worked.
//!
//! why subprocess?:
//!     the pi camera stack (libcamera) already handles exposure, focus and
//!     jpeg encoding. shelling out keeps the snapper free of camera bindings.
//!
//! relationships:
//!     - used by: main.rs (capture step before annotation)
//!
//! ==============================================================================

use anyhow::{anyhow, Context, Result};
use std::path::Path;
use std::process::Command;

pub trait Camera: Send + Sync {
    /// capture one still; `true` when the file was written
    fn grab_image(&self, width: u32, height: u32, output: &Path) -> bool;
}

pub struct ImageGrabber {
    command: String,
}

impl ImageGrabber {
    pub fn new(command: impl Into<String>) -> Self {
        Self { command: command.into() }
    }

    /// arguments for an immediate, preview-less single shot
    pub fn capture_args(width: u32, height: u32, output: &Path) -> Vec<String> {
        vec![
            "-t".to_string(),
            "1".to_string(),
            "--immediate".to_string(),
            "-n".to_string(),
            "1".to_string(),
            "--width".to_string(),
            width.to_string(),
            "--height".to_string(),
            height.to_string(),
            "-o".to_string(),
            output.display().to_string(),
        ]
    }

    fn run(&self, width: u32, height: u32, output: &Path) -> Result<()> {
        let result = Command::new(&self.command)
            .args(Self::capture_args(width, height, output))
            .output()
            .with_context(|| format!("failed to run {}", self.command))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(anyhow!("{} exited with {}: {}", self.command, result.status, stderr.trim()));
        }
        Ok(())
    }
}

impl Camera for ImageGrabber {
    fn grab_image(&self, width: u32, height: u32, output: &Path) -> bool {
        tracing::debug!("[CAMERA] Capturing {}x{} to {}", width, height, output.display());
        match self.run(width, height, output) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("[CAMERA] Capture failed: {:#}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_args() {
        let args = ImageGrabber::capture_args(3840, 2160, Path::new("/srv/photos/1.jpg"));
        assert_eq!(
            args,
            vec![
                "-t", "1", "--immediate", "-n", "1", "--width", "3840", "--height", "2160", "-o",
                "/srv/photos/1.jpg"
            ]
        );
    }

    #[test]
    fn test_missing_command_reports_failure() {
        let grabber = ImageGrabber::new("definitely-not-a-camera-binary");
        assert!(!grabber.grab_image(10, 10, Path::new("/tmp/never.jpg")));
    }

    #[cfg(unix)]
    #[test]
    fn test_exit_status_is_reported() {
        // `true` / `false` ignore their arguments
        assert!(ImageGrabber::new("true").grab_image(10, 10, Path::new("/tmp/x.jpg")));
        assert!(!ImageGrabber::new("false").grab_image(10, 10, Path::new("/tmp/x.jpg")));
    }
}
