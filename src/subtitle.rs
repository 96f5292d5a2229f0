use crate::utils::wrap_text;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

/// One timed caption block.
#[derive(Debug, Clone, PartialEq)]
pub struct Caption {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Writes captions as SRT. Each source line is wrapped to `width` chars.
pub fn write_srt(path: &Path, entries: &[Caption], width: usize) -> io::Result<()> {
    let mut f = File::create(path)?;
    for (i, entry) in entries.iter().enumerate() {
        writeln!(f, "{}", i + 1)?;
        writeln!(
            f,
            "{} --> {}",
            format_srt_time(entry.start),
            format_srt_time(entry.end)
        )?;
        for line in entry.text.lines() {
            for wrapped in wrap_text(line, width) {
                writeln!(f, "{}", wrapped)?;
            }
        }
        writeln!(f)?;
    }
    Ok(())
}

fn format_srt_time(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let ms = total_ms % 1000;
    let total_sec = total_ms / 1000;
    let s = total_sec % 60;
    let total_min = total_sec / 60;
    let m = total_min % 60;
    let h = total_min / 60;
    format!("{:02}:{:02}:{:02},{:03}", h, m, s, ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_srt_timestamps() {
        assert_eq!(format_srt_time(0.0), "00:00:00,000");
        assert_eq!(format_srt_time(3723.4567), "01:02:03,457");
        assert_eq!(format_srt_time(-1.0), "00:00:00,000");
    }

    #[test]
    fn writes_wrapped_caption_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slide.srt");
        let captions = vec![Caption {
            start: 0.0,
            end: 2.5,
            text: "Apple\nA very round red fruit".to_string(),
        }];
        write_srt(&path, &captions, 12).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            written,
            "1\n00:00:00,000 --> 00:00:02,500\nApple\nA very round\nred fruit\n\n"
        );
    }
}
