//! Prompts for generating practice sentences.

pub const PRACTICE_SYSTEM: &str = "You are a helpful teacher.";

/// Topic used when the user leaves the topic blank.
pub const DEFAULT_TOPIC: &str = "fun facts";

pub const PRACTICE_PROMPT_TEMPLATE: &str = "Generate 5 simple, clear sentences about \"{topic}\" \
suitable for handwriting practice. Do not use numbering or bullets. Just the sentences.";

pub fn build_practice_prompt(topic: &str) -> String {
    let topic = match topic.trim() {
        "" => DEFAULT_TOPIC,
        t => t,
    };
    PRACTICE_PROMPT_TEMPLATE.replace("{topic}", topic)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_contains_topic() {
        let prompt = build_practice_prompt("  ocean animals ");
        assert!(prompt.contains("about \"ocean animals\""));
        assert!(prompt.starts_with("Generate 5 simple, clear sentences"));
    }

    #[test]
    fn test_blank_topic_uses_default() {
        assert!(build_practice_prompt("   ").contains("\"fun facts\""));
    }
}
