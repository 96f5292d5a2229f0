use crate::interface::{SourceError, TopicSource};
use crate::llm::{ChatClient, JsonPrompt};
use crate::topics::NewTopic;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

pub const DEFAULT_CATEGORIES: [&str; 20] = [
    "English Basics",
    "Math Basics",
    "Early Reading",
    "Writing Practice",
    "Good Manners",
    "Good Character",
    "Daily Etiquette",
    "Moral Stories",
    "Thinking Skills",
    "Problem Solving",
    "Time & Routine",
    "Colors & Shapes",
    "Numbers in Daily Life",
    "Safety Basics",
    "Self-Care",
    "Organization & Responsibility",
    "Emotions",
    "Good Deeds",
    "Islamic Manners",
    "General Knowledge",
];

const FALLBACK_CATEGORY: &str = "General Knowledge";
const MAX_PER_REQUEST: usize = 50;

const SYSTEM_PROMPT: &str = "You are an expert educator creating safe, halal, kid-friendly \
educational content. Return only valid JSON.";

/// Hand-picked topics for seeding an empty database without an API key.
pub fn sample_topics() -> Vec<NewTopic> {
    [
        ("Saying Please", "Good Manners"),
        ("Saying Thank You", "Good Manners"),
        ("Numbers 1 to 5", "Math Basics"),
        ("Circle and Square", "Math Basics"),
        ("Red and Blue", "Colors & Shapes"),
        ("Telling the Truth", "Good Character"),
        ("Washing Hands", "Self-Care"),
        ("Morning Routine", "Time & Routine"),
        ("Being Careful at Home", "Safety Basics"),
        ("Sharing with Friends", "Good Deeds"),
    ]
    .into_iter()
    .map(|(text, category)| NewTopic::new(text, category))
    .collect()
}

#[derive(Debug, Deserialize)]
struct RawTopic {
    #[serde(default)]
    category: Option<String>,
    #[serde(default, alias = "subtopic")]
    topic: Option<String>,
}

pub struct AiTopicSource {
    chat: ChatClient,
}

impl AiTopicSource {
    pub fn new(chat: ChatClient) -> Self {
        Self { chat }
    }

    async fn generate_chunk(
        &self,
        count: usize,
        categories: &[String],
    ) -> Result<Vec<NewTopic>, SourceError> {
        let prompt = build_prompt(count, categories);
        let value = self
            .chat
            .complete_json(JsonPrompt {
                system: SYSTEM_PROMPT,
                user: &prompt,
                temperature: 0.8,
                max_tokens: Some(8000),
            })
            .await?;
        parse_topics(value)
    }
}

#[async_trait]
impl TopicSource for AiTopicSource {
    async fn generate(
        &self,
        count: usize,
        categories: &[String],
    ) -> Result<Vec<NewTopic>, SourceError> {
        let chunks = count.div_ceil(MAX_PER_REQUEST);
        let mut topics = Vec::with_capacity(count);

        for i in 0..chunks {
            let wanted = MAX_PER_REQUEST.min(count - topics.len());
            info!("Generating topic chunk {}/{} ({} topics)", i + 1, chunks, wanted);
            match self.generate_chunk(wanted, categories).await {
                Ok(batch) => topics.extend(batch),
                // Keep what earlier chunks produced; the caller decides if it is enough.
                Err(e) if !topics.is_empty() => {
                    warn!("Topic chunk {} failed, keeping {} topics: {}", i + 1, topics.len(), e);
                    break;
                }
                Err(e) => return Err(e),
            }
            if topics.len() >= count {
                break;
            }
        }

        topics.truncate(count);
        info!("Generated {} topics with {}", topics.len(), self.chat.model());
        Ok(topics)
    }
}

fn build_prompt(count: usize, categories: &[String]) -> String {
    format!(
        r#"Generate {count} unique, educational topics for young children (ages 4-10).

IMPORTANT RULES:
- Content must be halal, safe, and age-appropriate
- NO topics about humans, faces, animals, or living creatures
- Focus on concepts, manners, skills, and knowledge
- Each topic should be a short, specific lesson title

CATEGORIES: {}

Return ONLY a JSON object with this structure:
{{
  "topics": [
    {{"category": "Good Manners", "topic": "Saying Thank You"}},
    {{"category": "Math Basics", "topic": "Numbers 1 to 10"}}
  ]
}}

Generate {count} diverse topics covering all categories."#,
        categories.join(", ")
    )
}

/// Accepts `{"topics": [...]}`, a bare array, or the first array found in
/// the object. Entries without topic text are dropped.
fn parse_topics(value: serde_json::Value) -> Result<Vec<NewTopic>, SourceError> {
    let list = match value {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(mut map) => match map.remove("topics") {
            Some(serde_json::Value::Array(items)) => items,
            _ => map
                .into_iter()
                .find_map(|(_, v)| match v {
                    serde_json::Value::Array(items) => Some(items),
                    _ => None,
                })
                .ok_or_else(|| SourceError::Malformed("no topic list in reply".to_string()))?,
        },
        other => {
            return Err(SourceError::Malformed(format!(
                "expected topic list, got {other}"
            )));
        }
    };

    let topics: Vec<NewTopic> = list
        .into_iter()
        .filter_map(|item| serde_json::from_value::<RawTopic>(item).ok())
        .filter_map(|raw| {
            let text = raw.topic?.trim().to_string();
            if text.is_empty() {
                return None;
            }
            let category = raw
                .category
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| FALLBACK_CATEGORY.to_string());
            Some(NewTopic::new(text, category))
        })
        .collect();

    if topics.is_empty() {
        return Err(SourceError::Malformed("reply listed no usable topics".to_string()));
    }
    Ok(topics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_wrapped_topic_list() {
        let topics = parse_topics(json!({
            "topics": [
                {"category": "Good Manners", "topic": "Saying Please"},
                {"category": "Math Basics", "subtopic": "Counting to Ten"},
                {"category": "Math Basics"},
                {"topic": "   "},
                {"topic": "Shapes Around Us"}
            ]
        }))
        .unwrap();

        assert_eq!(
            topics,
            vec![
                NewTopic::new("Saying Please", "Good Manners"),
                NewTopic::new("Counting to Ten", "Math Basics"),
                NewTopic::new("Shapes Around Us", FALLBACK_CATEGORY),
            ]
        );
    }

    #[test]
    fn accepts_bare_array_and_other_keys() {
        let bare =
            parse_topics(json!([{"category": "Emotions", "topic": "Feeling Calm"}])).unwrap();
        assert_eq!(bare.len(), 1);

        let keyed = parse_topics(json!({"items": [{"topic": "Tidy Up"}]})).unwrap();
        assert_eq!(keyed[0].text, "Tidy Up");
    }

    #[test]
    fn rejects_replies_without_topics() {
        assert!(matches!(
            parse_topics(json!({"message": "sorry"})),
            Err(SourceError::Malformed(_))
        ));
        assert!(matches!(parse_topics(json!({"topics": []})), Err(SourceError::Malformed(_))));
    }

    #[test]
    fn prompt_lists_categories_and_count() {
        let prompt = build_prompt(7, &["Emotions".to_string(), "Self-Care".to_string()]);
        assert!(prompt.contains("Generate 7 unique"));
        assert!(prompt.contains("CATEGORIES: Emotions, Self-Care"));
    }

    #[test]
    fn samples_are_unique() {
        let samples = sample_topics();
        let mut texts: Vec<_> = samples.iter().map(|t| t.text.to_lowercase()).collect();
        texts.sort();
        texts.dedup();
        assert_eq!(texts.len(), samples.len());
    }
}
