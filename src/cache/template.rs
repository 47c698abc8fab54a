//! Stage-indexed response templates (tier3)

use crate::error::{CacheError, Result};
use std::collections::HashMap;

/// Stage used when the requested stage has no templates
pub const FALLBACK_STAGE: &str = "intent_detection";

/// Rendered in place of `{topic}` when the turn has no topic
pub const DEFAULT_TOPIC_TEXT: &str = "this topic";

const BUILTIN_TEMPLATES: &[(&str, &[&str])] = &[
    (
        "greeting",
        &[
            "Hi {user_name}, I'm your AI English tutor. What would you like to learn today?",
            "Hello {user_name}! Ready to practice English now?",
        ],
    ),
    (
        "intent_detection",
        &[
            "Thanks for sharing, {user_name}. Are you focusing on vocabulary, grammar, or pronunciation?",
            "Great, {user_name}! Should we dive into vocabulary, grammar, or a casual topic?",
        ],
    ),
    (
        "vocabulary_learning",
        &[
            "Let's explore a new vocabulary word together. I'll guide you through examples.",
            "Great choice! I'll walk you through some practical vocabulary on {topic}.",
        ],
    ),
    (
        "sentence_practice",
        &[
            "Let's build a sentence together using proper structure.",
            "I'll help you refine that sentence with better grammar.",
        ],
    ),
    (
        "topic_discussion",
        &[
            "Let's keep discussing {topic}. Share what you think and I'll guide you.",
            "Interesting topic! Tell me more about {topic}, and I'll help polish your English.",
        ],
    ),
    (
        "grammar_focus",
        &[
            "Let's slow down and review the grammar rule step by step.",
            "Great attempt! Remember the grammar rule about {topic}.",
        ],
    ),
    (
        "pronunciation_practice",
        &[
            "I'll break the pronunciation down into smaller parts for you.",
            "Repeat after me and focus on the syllables I'm emphasizing.",
        ],
    ),
    (
        "closing",
        &[
            "Nice work today, {user_name}! Want to review anything before we wrap up?",
            "You're making solid progress, {user_name}. Ready for another round or shall we end here?",
        ],
    ),
];

/// Static fallback responses keyed by conversation stage.
///
/// Selection hashes `stage:topic:user_name` with MD5, so identical inputs
/// always render the same template while different learners see variety.
#[derive(Debug, Clone)]
pub struct TemplateEngine {
    templates: HashMap<String, Vec<String>>,
}

impl Default for TemplateEngine {
    fn default() -> Self {
        let templates = BUILTIN_TEMPLATES
            .iter()
            .map(|(stage, list)| {
                (
                    stage.to_string(),
                    list.iter().map(|t| t.to_string()).collect(),
                )
            })
            .collect();
        Self { templates }
    }
}

impl TemplateEngine {
    /// Engine without any templates; `select_template` always misses
    pub fn empty() -> Self {
        Self {
            templates: HashMap::new(),
        }
    }

    pub fn with_templates(templates: HashMap<String, Vec<String>>) -> Self {
        Self { templates }
    }

    /// Parse a `{"stage": ["template", ...]}` JSON object
    pub fn from_json_str(json: &str) -> Result<Self> {
        let templates: HashMap<String, Vec<String>> = serde_json::from_str(json)?;
        if let Some((stage, _)) = templates.iter().find(|(_, list)| list.is_empty()) {
            return Err(CacheError::TemplateError(format!(
                "stage {} has an empty template list",
                stage
            )));
        }
        Ok(Self { templates })
    }

    /// Replace the templates of one stage
    pub fn set_stage_templates(&mut self, stage: impl Into<String>, templates: Vec<String>) {
        self.templates.insert(stage.into(), templates);
    }

    pub fn stages(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    /// Pick and render the template for a turn.
    ///
    /// Unknown stages fall back to `intent_detection`. Returns `None` only when
    /// neither list has templates.
    pub fn select_template(
        &self,
        stage: &str,
        user_name: &str,
        topic: Option<&str>,
    ) -> Option<String> {
        let templates = self
            .templates
            .get(stage)
            .filter(|list| !list.is_empty())
            .or_else(|| self.templates.get(FALLBACK_STAGE))
            .filter(|list| !list.is_empty())?;

        let index = selection_index(stage, user_name, topic, templates.len());
        Some(render(&templates[index], user_name, topic))
    }
}

fn selection_index(stage: &str, user_name: &str, topic: Option<&str>, len: usize) -> usize {
    let seed = format!("{}:{}:{}", stage, topic.unwrap_or(""), user_name);
    let digest = md5::compute(seed.as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest.0[..8]);
    (u64::from_be_bytes(head) % len as u64) as usize
}

fn render(template: &str, user_name: &str, topic: Option<&str>) -> String {
    template
        .replace("{user_name}", user_name)
        .replace("{topic}", topic.unwrap_or(DEFAULT_TOPIC_TEXT))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_is_deterministic() {
        let engine = TemplateEngine::default();
        let first = engine.select_template("greeting", "Amina", None).unwrap();
        let second = engine.select_template("greeting", "Amina", None).unwrap();
        assert_eq!(first, second);
        assert!(first.contains("Amina"));
    }

    #[test]
    fn test_unknown_stage_falls_back_to_intent_detection() {
        let engine = TemplateEngine::default();
        let text = engine.select_template("mystery_stage", "Kofi", None).unwrap();
        assert!(text.contains("Kofi"));
        assert!(text.contains("vocabulary, grammar"));
    }

    #[test]
    fn test_topic_placeholder() {
        let mut engine = TemplateEngine::empty();
        engine.set_stage_templates("topic_discussion", vec!["Tell me about {topic}.".to_string()]);
        assert_eq!(
            engine.select_template("topic_discussion", "Li", Some("food")).unwrap(),
            "Tell me about food."
        );
        assert_eq!(
            engine.select_template("topic_discussion", "Li", None).unwrap(),
            "Tell me about this topic."
        );
    }

    #[test]
    fn test_no_templates_misses() {
        let engine = TemplateEngine::empty();
        assert!(engine.select_template("greeting", "Amina", None).is_none());
    }

    #[test]
    fn test_selection_varies_across_users() {
        let engine = TemplateEngine::default();
        let rendered: std::collections::HashSet<String> = (0..40)
            .map(|i| {
                let name = format!("learner{}", i);
                engine
                    .select_template("greeting", &name, None)
                    .unwrap()
                    .replace(&name, "")
            })
            .collect();
        assert_eq!(rendered.len(), 2);
    }

    #[test]
    fn test_from_json_str() {
        let engine =
            TemplateEngine::from_json_str(r#"{"intent_detection": ["Hey {user_name}"]}"#).unwrap();
        assert_eq!(
            engine.select_template("anything", "Sam", None).unwrap(),
            "Hey Sam"
        );

        assert!(matches!(
            TemplateEngine::from_json_str(r#"{"greeting": []}"#),
            Err(CacheError::TemplateError(_))
        ));
        assert!(matches!(
            TemplateEngine::from_json_str("not json"),
            Err(CacheError::SerializationError(_))
        ));
    }
}
