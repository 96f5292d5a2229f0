use crate::lesson::Lesson;
use crate::topics::Topic;
use crate::utils::truncate_chars;
use serde::Serialize;

const MAX_TITLE_CHARS: usize = 100;
const MAX_DESCRIPTION_CHARS: usize = 5000;
const MAX_TAGS: usize = 15;
/// Platform category for "Education".
const EDUCATION_CATEGORY: &str = "27";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VideoMetadata {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub category_id: String,
    pub privacy_status: String,
    pub made_for_kids: bool,
}

impl VideoMetadata {
    pub fn for_topic(topic: &Topic, lesson: &Lesson) -> Self {
        let title = format!("{}: {} | Kids Learning #Shorts", topic.category, topic.text);
        let description = format!(
            "Learn about {} in this short educational video for kids!\n\n\
             🎓 Category: {}\n\
             📚 Lesson: {}\n\n\
             Perfect for young learners to understand important concepts \
             in a fun and engaging way.\n\n\
             #Shorts #KidsEducation #Learning #Educational #Kids #Children\n",
            topic.text, topic.category, lesson.title
        );

        let mut tags: Vec<String> = Vec::new();
        for tag in [
            "kids education".to_string(),
            "learning for kids".to_string(),
            "educational video".to_string(),
            topic.category.to_lowercase(),
            topic.text.to_lowercase(),
            "shorts".to_string(),
            "youtube shorts".to_string(),
            "kids learning".to_string(),
            "children education".to_string(),
        ] {
            if !tag.is_empty() && !tags.contains(&tag) {
                tags.push(tag);
            }
        }
        tags.truncate(MAX_TAGS);

        Self {
            title: truncate_chars(&title, MAX_TITLE_CHARS),
            description: truncate_chars(&description, MAX_DESCRIPTION_CHARS),
            tags,
            category_id: EDUCATION_CATEGORY.to_string(),
            privacy_status: "public".to_string(),
            made_for_kids: true,
        }
    }
}
