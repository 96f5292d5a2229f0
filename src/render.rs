//! Narrated 9:16 slide videos built with piper and ffmpeg.
//!
//! Every slide becomes a short clip: a solid background, the slide text burned
//! in as a caption, and the narration for that slide. The clips are then
//! joined with ffmpeg's concat demuxer.

use crate::audio::wav_duration_seconds;
use crate::interface::{RenderError, Renderer};
use crate::lesson::{Lesson, Slide};
use crate::subtitle::{Caption, write_srt};
use crate::topics::Topic;
use crate::tts::tts_generate_chunk;
use async_trait::async_trait;
use chrono::Utc;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, error, info, warn};

const WIDTH: u32 = 1080;
const HEIGHT: u32 = 1920;
const FPS: u32 = 24;
/// Silence after each slide's narration, in seconds.
const SLIDE_PADDING: f64 = 1.0;
/// YouTube treats longer uploads as regular videos, not Shorts.
const MAX_SHORTS_SECONDS: f64 = 60.0;

/// Background colours, cycled per slide.
const BACKGROUNDS: [&str; 4] = ["0x192D55", "0x2D5541", "0x5F2341", "0x553719"];
/// Title accents in ASS `&HBBGGRR&` order: golden yellow, cyan, pink, orange.
const ACCENTS: [&str; 4] = ["&H0000C8FF&", "&H0096FF00&", "&H009664FF&", "&H000096FF&"];

#[derive(Debug, Clone)]
pub struct SlideRenderer {
    piper_model: PathBuf,
    work_dir: PathBuf,
}

impl SlideRenderer {
    pub fn new(piper_model: impl Into<PathBuf>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            piper_model: piper_model.into(),
            work_dir: work_dir.into(),
        }
    }

    fn slides_dir(&self) -> PathBuf {
        self.work_dir.join("slides")
    }

    fn render_blocking(&self, slides: &[Slide], topic_id: i64) -> Result<PathBuf, RenderError> {
        if !self.piper_model.exists() {
            return Err(RenderError::Resource(format!(
                "piper model not found: {}",
                self.piper_model.display()
            )));
        }

        let tmp_dir = self.slides_dir();
        if tmp_dir.exists() {
            debug!("Removing existing slide dir {}", tmp_dir.display());
            fs::remove_dir_all(&tmp_dir).map_err(resource)?;
        }
        fs::create_dir_all(&tmp_dir).map_err(resource)?;

        let mut clips = Vec::with_capacity(slides.len());
        let mut durations = Vec::with_capacity(slides.len());
        for (i, slide) in slides.iter().enumerate() {
            let (clip, duration) = self.render_slide(&tmp_dir, i, slide)?;
            info!("Slide {}/{} rendered ({:.1}s)", i + 1, slides.len(), duration);
            clips.push(clip);
            durations.push(duration);
        }

        let total = durations.iter().sum::<f64>();
        if exceeds_shorts_limit(total) {
            warn!(
                "Video is {:.1}s, longer than the {}s Shorts limit",
                total, MAX_SHORTS_SECONDS
            );
        }

        let out = self
            .work_dir
            .join(format!("video_{}_{}.mp4", topic_id, Utc::now().timestamp()));
        concat_clips(&tmp_dir, &clips, &out)?;
        info!("Final video written to {}", out.display());
        Ok(out)
    }

    /// Renders one slide clip and returns its file name and length in seconds.
    fn render_slide(
        &self,
        dir: &Path,
        index: usize,
        slide: &Slide,
    ) -> Result<(String, f64), RenderError> {
        let wav_name = format!("slide_{index}.wav");
        let srt_name = format!("slide_{index}.srt");
        let clip_name = format!("slide_{index}.mp4");

        let narration = if slide.narration.trim().is_empty() {
            slide.text.as_str()
        } else {
            slide.narration.as_str()
        };
        tts_generate_chunk(&self.piper_model, narration, &dir.join(&wav_name))?;
        let duration = wav_duration_seconds(&dir.join(&wav_name))? + SLIDE_PADDING;

        let caption = Caption {
            start: 0.0,
            end: duration,
            text: slide.text.clone(),
        };
        let width = if slide.is_title { 15 } else { 20 };
        write_srt(&dir.join(&srt_name), &[caption], width).map_err(resource)?;

        let background = BACKGROUNDS[index % BACKGROUNDS.len()];
        let (font_size, colour) = if slide.is_title {
            (28, ACCENTS[index % ACCENTS.len()])
        } else {
            (20, "&H00FFFFFF&")
        };
        let source = format!("color=c={background}:s={WIDTH}x{HEIGHT}:r={FPS}:d={duration:.3}");
        let filter = format!(
            "subtitles={srt_name}:force_style='Fontsize={font_size},PrimaryColour={colour},\
             Alignment=10,Bold=1,OutlineColour=&H000000&,Outline=2,Shadow=1'"
        );
        let duration_arg = format!("{duration:.3}");

        run_ffmpeg(
            dir,
            &[
                "-y", "-f", "lavfi", "-i", &source, "-i", &wav_name, "-vf", &filter, "-af",
                "apad", "-t", &duration_arg, "-c:v", "libx264", "-pix_fmt", "yuv420p", "-c:a",
                "aac", "-ar", "44100", &clip_name,
            ],
        )?;
        Ok((clip_name, duration))
    }
}

#[async_trait]
impl Renderer for SlideRenderer {
    async fn render(&self, lesson: &Lesson, topic: &Topic) -> Result<PathBuf, RenderError> {
        info!("Rendering video for topic {}", topic.id);
        let renderer = self.clone();
        let slides = lesson.slides();
        let topic_id = topic.id;
        tokio::task::spawn_blocking(move || renderer.render_blocking(&slides, topic_id))
            .await
            .map_err(|e| RenderError::Resource(format!("render task failed: {e}")))?
    }

    fn cleanup(&self) -> std::io::Result<()> {
        let dir = self.slides_dir();
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
            info!("Removed slide files in {}", dir.display());
        }
        Ok(())
    }
}

fn concat_clips(dir: &Path, clips: &[String], out: &Path) -> Result<(), RenderError> {
    let concat_list = dir.join("files.txt");
    {
        let mut f = File::create(&concat_list).map_err(resource)?;
        for clip in clips {
            writeln!(f, "file '{}'", clip).map_err(resource)?;
        }
    }

    let out_arg = absolute(out).to_string_lossy().into_owned();

    let copied = run_ffmpeg(
        dir,
        &["-y", "-f", "concat", "-safe", "0", "-i", "files.txt", "-c", "copy", &out_arg],
    );
    if copied.is_err() {
        warn!("ffmpeg concat with copy failed; retrying with re-encode");
        run_ffmpeg(
            dir,
            &[
                "-y", "-f", "concat", "-safe", "0", "-i", "files.txt", "-c:v", "libx264",
                "-pix_fmt", "yuv420p", "-c:a", "aac", &out_arg,
            ],
        )?;
    }
    Ok(())
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    }
}

fn run_ffmpeg(dir: &Path, args: &[&str]) -> Result<(), RenderError> {
    let status = Command::new("ffmpeg")
        .current_dir(dir)
        .args(["-hide_banner", "-loglevel", "error"])
        .args(args)
        .status()
        .map_err(|e| RenderError::Resource(format!("failed to run ffmpeg: {e}")))?;
    if !status.success() {
        error!("ffmpeg failed in {}: {:?}", dir.display(), args);
        return Err(RenderError::Encoding(format!("ffmpeg exited with {status}")));
    }
    Ok(())
}

fn exceeds_shorts_limit(total_seconds: f64) -> bool {
    total_seconds > MAX_SHORTS_SECONDS
}

fn resource(e: std::io::Error) -> RenderError {
    RenderError::Resource(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topics::TopicStatus;

    #[tokio::test]
    async fn missing_piper_model_is_a_resource_error() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = SlideRenderer::new(dir.path().join("missing.onnx"), dir.path());
        let lesson = Lesson {
            title: "Red".to_string(),
            explanation: "Red is warm.".to_string(),
            examples: vec!["Apple".to_string()],
            practice: "Find red!".to_string(),
        };
        let topic = Topic {
            id: 1,
            text: "Red".to_string(),
            category: "Colors & Shapes".to_string(),
            status: TopicStatus::Used,
            created_at: Utc::now(),
            used_at: None,
        };

        let err = renderer.render(&lesson, &topic).await.unwrap_err();
        assert!(matches!(err, RenderError::Resource(_)));
    }

    #[test]
    fn sixty_seconds_is_the_longest_short() {
        assert!(!exceeds_shorts_limit(45.5));
        assert!(!exceeds_shorts_limit(60.0));
        assert!(exceeds_shorts_limit(60.01));
    }

    #[test]
    fn cleanup_removes_slide_directory() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = SlideRenderer::new("model.onnx", dir.path());
        fs::create_dir_all(renderer.slides_dir()).unwrap();
        fs::write(renderer.slides_dir().join("slide_0.wav"), b"x").unwrap();

        renderer.cleanup().unwrap();
        assert!(!renderer.slides_dir().exists());
        renderer.cleanup().unwrap();
    }
}
