//! Four-part lessons and the AI source that writes them.

use crate::interface::{LessonSource, SourceError};
use crate::llm::{ChatClient, JsonPrompt};
use crate::topics::Topic;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Lesson {
    pub title: String,
    pub explanation: String,
    pub examples: Vec<String>,
    pub practice: String,
}

/// One screen of the finished video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slide {
    pub text: String,
    pub narration: String,
    pub is_title: bool,
}

impl Lesson {
    pub fn slides(&self) -> Vec<Slide> {
        vec![
            Slide {
                text: self.title.clone(),
                narration: self.title.clone(),
                is_title: true,
            },
            Slide {
                text: self.explanation.clone(),
                narration: self.explanation.clone(),
                is_title: false,
            },
            Slide {
                text: self.examples.join("\n"),
                narration: self.examples.join(". "),
                is_title: false,
            },
            Slide {
                text: self.practice.clone(),
                narration: self.practice.clone(),
                is_title: false,
            },
        ]
    }

    /// Whole lesson as one spoken script.
    pub fn narration(&self) -> String {
        self.slides()
            .iter()
            .map(|s| s.narration.trim().trim_end_matches('.'))
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(". ")
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawExamples {
    List(Vec<String>),
    Text(String),
}

impl RawExamples {
    fn into_vec(self) -> Vec<String> {
        let items = match self {
            RawExamples::List(items) => items,
            RawExamples::Text(text) => text.lines().map(str::to_string).collect(),
        };
        items
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct RawLesson {
    #[serde(default, alias = "slide1")]
    title: Option<String>,
    #[serde(default, alias = "slide2")]
    explanation: Option<String>,
    #[serde(default, alias = "slide3")]
    examples: Option<RawExamples>,
    #[serde(default, alias = "slide4")]
    practice: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl RawLesson {
    fn parse(value: serde_json::Value) -> Result<Self, SourceError> {
        serde_json::from_value(value)
            .map_err(|e| SourceError::Malformed(format!("lesson JSON did not match: {e}")))
    }

    /// Missing parts come from `base`.
    fn complete_with(self, base: &Lesson) -> Lesson {
        let examples = self
            .examples
            .map(RawExamples::into_vec)
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| base.examples.clone());
        Lesson {
            title: non_empty(self.title).unwrap_or_else(|| base.title.clone()),
            explanation: non_empty(self.explanation).unwrap_or_else(|| base.explanation.clone()),
            examples,
            practice: non_empty(self.practice).unwrap_or_else(|| base.practice.clone()),
        }
    }
}

fn default_lesson(topic: &Topic) -> Lesson {
    Lesson {
        title: topic.text.clone(),
        explanation: format!("Look at {}!", topic.text),
        examples: vec!["Cool".to_string(), "Fun".to_string(), "Great".to_string()],
        practice: "You do it!".to_string(),
    }
}

const DRAFT_SYSTEM: &str =
    "You are an expert in toddler education. You speak in very few, simple words.";
const IMPROVE_SYSTEM: &str =
    "You are a Kid-Friendly AI specialized in extreme simplicity and engagement.";

fn draft_prompt(topic: &Topic) -> String {
    format!(
        r#"Create a 4-slide educational lesson for toddlers (ages 2-5).

TOPIC: {} ({})

STRICT RULES FOR KIDS:
1. EXTREME SIMPLICITY: Use as few words as possible.
2. NO animals, humans, or living creatures.
3. title: 1-2 words only.
4. explanation: 1 very short sentence (max 5 words).
5. examples: 3 simple objects, 1 word each.
6. practice: 1 very short instruction (max 4 words).

FORMAT: Return ONLY JSON.
{{"title": "Title", "explanation": "Simple sentence.",
 "examples": ["Word1", "Word2", "Word3"], "practice": "Action word!"}}"#,
        topic.text, topic.category
    )
}

fn improve_prompt(draft: &Lesson) -> String {
    format!(
        r#"Take this 4-slide lesson and make it even more fun, simpler and engaging
for a 3-year-old.

title: {}
explanation: {}
examples: {}
practice: {}

Make words sound happier, keep NO animals or humans, and reduce the word count.
Return JSON with keys: title, explanation, examples (array of strings), practice."#,
        draft.title,
        draft.explanation,
        draft.examples.join(", "),
        draft.practice
    )
}

pub struct AiLessonSource {
    chat: ChatClient,
}

impl AiLessonSource {
    pub fn new(chat: ChatClient) -> Self {
        Self { chat }
    }

    async fn improve(&self, draft: &Lesson) -> Result<Lesson, SourceError> {
        let value = self
            .chat
            .complete_json(JsonPrompt {
                system: IMPROVE_SYSTEM,
                user: &improve_prompt(draft),
                temperature: 0.8,
                max_tokens: None,
            })
            .await?;
        Ok(RawLesson::parse(value)?.complete_with(draft))
    }
}

#[async_trait]
impl LessonSource for AiLessonSource {
    async fn generate(&self, topic: &Topic) -> Result<Lesson, SourceError> {
        info!("Generating lesson for: {} - {}", topic.category, topic.text);
        let value = self
            .chat
            .complete_json(JsonPrompt {
                system: DRAFT_SYSTEM,
                user: &draft_prompt(topic),
                temperature: 0.7,
                max_tokens: None,
            })
            .await?;
        let draft = RawLesson::parse(value)?.complete_with(&default_lesson(topic));

        match self.improve(&draft).await {
            Ok(improved) => {
                info!("Lesson improved for topic {}", topic.id);
                Ok(improved)
            }
            Err(e) => {
                warn!("Lesson improvement failed, using draft: {}", e);
                Ok(draft)
            }
        }
    }
}
