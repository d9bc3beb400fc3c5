//! Video frame extraction via an external `ffmpeg` process (spec §4.3
//! "video"). All scratch files live in a unique per-call temp directory,
//! removed unconditionally on return.

use prov_types::{CoreError, Result};
use std::time::Duration;
use tokio::process::Command;

const EXTRACTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Writes `video_bytes` to a scratch file, runs `ffmpeg -vf fps=1` to
/// sample one frame per second (capped at `max_frames`), and returns the
/// resulting JPEG bytes in presentation order. The scratch directory is
/// removed whether extraction succeeds or fails.
pub async fn extract_video_frames(video_bytes: &[u8], max_frames: u32) -> Result<Vec<Vec<u8>>> {
    let dir = tempfile::tempdir()
        .map_err(|e| CoreError::Internal(format!("failed to create scratch directory: {e}")))?;
    let input_path = dir.path().join("input.mp4");
    let output_pattern = dir.path().join("frame_%04d.jpg");

    tokio::fs::write(&input_path, video_bytes)
        .await
        .map_err(|e| CoreError::Internal(format!("failed to write scratch video: {e}")))?;

    let mut child = Command::new("ffmpeg")
        .arg("-i")
        .arg(&input_path)
        .arg("-vf")
        .arg("fps=1")
        .arg("-frames:v")
        .arg(max_frames.to_string())
        .arg(&output_pattern)
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::piped())
        .spawn()
        .map_err(|e| CoreError::UpstreamError(format!("failed to spawn ffmpeg: {e}")))?;

    let status = match tokio::time::timeout(EXTRACTION_TIMEOUT, child.wait()).await {
        Ok(result) => {
            result.map_err(|e| CoreError::UpstreamError(format!("ffmpeg wait failed: {e}")))?
        }
        Err(_) => {
            let _ = child.kill().await;
            return Err(CoreError::UpstreamTimeout(
                "frame extraction timed out".to_string(),
            ));
        }
    };

    if !status.success() {
        return Err(CoreError::UpstreamError(
            "ffmpeg exited with a non-zero status".to_string(),
        ));
    }

    let mut entries = tokio::fs::read_dir(dir.path())
        .await
        .map_err(|e| CoreError::Internal(format!("failed to read scratch directory: {e}")))?;
    let mut frame_paths = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| CoreError::Internal(format!("failed to list scratch directory: {e}")))?
    {
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with("frame_") {
            frame_paths.push(entry.path());
        }
    }
    frame_paths.sort();

    let mut frames = Vec::with_capacity(frame_paths.len());
    for path in frame_paths {
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| CoreError::Internal(format!("failed to read extracted frame: {e}")))?;
        frames.push(bytes);
    }
    Ok(frames)
}
