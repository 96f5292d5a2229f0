use crate::interface::RenderError;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::{debug, error};

/// Speaks `text` with piper into a WAV file at `out_path`.
pub fn tts_generate_chunk(model: &Path, text: &str, out_path: &Path) -> Result<(), RenderError> {
    debug!("Calling piper for {}", out_path.display());
    let mut child = Command::new("piper")
        .arg("--model")
        .arg(model)
        .arg("--output_file")
        .arg(out_path)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|e| RenderError::Resource(format!("failed to spawn piper: {e}")))?;

    // Dropping stdin closes the pipe so piper sees EOF.
    {
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| RenderError::Resource("piper stdin unavailable".to_string()))?;
        stdin
            .write_all(text.as_bytes())
            .map_err(|e| RenderError::Resource(format!("failed to feed piper: {e}")))?;
    }

    let status = child
        .wait()
        .map_err(|e| RenderError::Resource(format!("piper did not finish: {e}")))?;
    if !status.success() {
        error!("Piper TTS command failed for {}", out_path.display());
        return Err(RenderError::Encoding(format!(
            "piper exited with {status} for {}",
            out_path.display()
        )));
    }
    Ok(())
}
