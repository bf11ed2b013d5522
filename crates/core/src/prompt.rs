//! Prompt construction for image generation and companion chat.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Image prompts
// ---------------------------------------------------------------------------

/// Style presets selectable by the client, with the text they expand to.
pub const STYLE_PRESETS: &[(&str, &str)] = &[
    (
        "realistic",
        "photorealistic, ultra detailed, natural lighting, 35mm photograph",
    ),
    ("anime", "anime style, vibrant colors, clean lineart, cel shading"),
    (
        "fantasy",
        "fantasy art, ethereal atmosphere, intricate details, painterly",
    ),
    (
        "cinematic",
        "cinematic still, dramatic lighting, shallow depth of field, film grain",
    ),
    ("3d", "3d render, octane render, soft global illumination"),
];

/// Appended to every negative prompt.
pub const DEFAULT_NEGATIVE_PROMPT: &str =
    "lowres, bad anatomy, bad hands, extra fingers, blurry, watermark, text, jpeg artifacts";

/// Inputs for [`build_image_prompt`].
#[derive(Debug, Default, Clone, Copy)]
pub struct ImagePromptParts<'a> {
    pub prompt: &'a str,
    pub negative_prompt: Option<&'a str>,
    pub style: Option<&'a str>,
    pub character_appearance: Option<&'a str>,
    pub category: Option<&'a str>,
}

/// Positive and negative prompt sent to the GPU worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltPrompt {
    pub positive: String,
    pub negative: String,
}

/// Look up a style preset's expansion.
pub fn style_preset(name: &str) -> Option<&'static str> {
    STYLE_PRESETS
        .iter()
        .find(|(key, _)| *key == name)
        .map(|(_, text)| *text)
}

/// Assemble the final prompt.
///
/// Order: character appearance, user prompt, category, style expansion.
/// Empty parts are skipped. The user's negative prompt is placed before the
/// default one.
pub fn build_image_prompt(parts: ImagePromptParts<'_>) -> Result<BuiltPrompt, CoreError> {
    let prompt = parts.prompt.trim();
    if prompt.is_empty() {
        return Err(CoreError::Validation("Prompt must not be empty".into()));
    }

    let style = match parts.style {
        Some(name) => Some(style_preset(name).ok_or_else(|| {
            CoreError::Validation(format!("Unknown style preset '{name}'"))
        })?),
        None => None,
    };

    let positive = [
        parts.character_appearance.map(str::trim),
        Some(prompt),
        parts.category.map(str::trim),
        style,
    ]
    .into_iter()
    .flatten()
    .filter(|s| !s.is_empty())
    .collect::<Vec<_>>()
    .join(", ");

    let negative = match parts.negative_prompt.map(str::trim) {
        Some(user) if !user.is_empty() => format!("{user}, {DEFAULT_NEGATIVE_PROMPT}"),
        _ => DEFAULT_NEGATIVE_PROMPT.to_string(),
    };

    Ok(BuiltPrompt { positive, negative })
}

// ---------------------------------------------------------------------------
// Chat prompts
// ---------------------------------------------------------------------------

/// Speaker of a chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(self) -> &'static str {
        match self {
            ChatRole::System => "system",
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }

    /// Parse a stored role; anything but `assistant`/`system` is the user.
    pub fn parse(s: &str) -> Self {
        match s {
            "assistant" => ChatRole::Assistant,
            "system" => ChatRole::System,
            _ => ChatRole::User,
        }
    }
}

/// One message in an LLM conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Persona fields used to build a companion's system prompt.
#[derive(Debug, Default, Clone, Copy)]
pub struct Persona<'a> {
    pub name: &'a str,
    pub personality: Option<&'a str>,
    pub appearance: Option<&'a str>,
    pub scenario: Option<&'a str>,
}

/// Build the system prompt for a companion, addressing the user by name.
pub fn build_persona_prompt(persona: Persona<'_>, user_name: &str) -> String {
    let mut prompt = format!(
        "You are {name}, a companion chatting with {user_name}. Stay in character \
         as {name} at all times and never mention being an AI model.",
        name = persona.name
    );
    let sections = [
        ("Personality", persona.personality),
        ("Appearance", persona.appearance),
        ("Scenario", persona.scenario),
    ];
    for (label, value) in sections {
        if let Some(text) = value.map(str::trim).filter(|t| !t.is_empty()) {
            prompt.push_str(&format!("\n\n{label}: {}", text.replace("{{user}}", user_name)));
        }
    }
    prompt.push_str("\n\nReply in a natural, conversational tone and keep replies concise.");
    prompt
}

/// Assemble the message list sent to the LLM.
///
/// The system prompt comes first. When there is no prior history the
/// greeting (if any) is inserted as the companion's opening line. Only the
/// most recent `max_history` turns are kept, then the new user message is
/// appended.
pub fn build_chat_context(
    system_prompt: &str,
    greeting: Option<&str>,
    history: &[ChatTurn],
    user_message: &str,
    max_history: usize,
) -> Vec<ChatTurn> {
    let mut turns = Vec::with_capacity(history.len().min(max_history) + 3);
    turns.push(ChatTurn::new(ChatRole::System, system_prompt));

    if history.is_empty() {
        if let Some(greeting) = greeting.filter(|g| !g.trim().is_empty()) {
            turns.push(ChatTurn::new(ChatRole::Assistant, greeting));
        }
    }

    let skip = history.len().saturating_sub(max_history);
    turns.extend(history.iter().skip(skip).cloned());
    turns.push(ChatTurn::new(ChatRole::User, user_message));
    turns
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_joins_parts_in_order() {
        let built = build_image_prompt(ImagePromptParts {
            prompt: "walking on a beach",
            character_appearance: Some("red hair, green eyes"),
            category: Some("Outdoors"),
            style: Some("anime"),
            negative_prompt: None,
        })
        .unwrap();
        assert_eq!(
            built.positive,
            "red hair, green eyes, walking on a beach, Outdoors, anime style, vibrant colors, clean lineart, cel shading"
        );
        assert_eq!(built.negative, DEFAULT_NEGATIVE_PROMPT);
    }

    #[test]
    fn user_negative_prompt_precedes_default() {
        let built = build_image_prompt(ImagePromptParts {
            prompt: "portrait",
            negative_prompt: Some("hats"),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(built.positive, "portrait");
        assert!(built.negative.starts_with("hats, lowres"));
    }

    #[test]
    fn unknown_style_rejected() {
        let err = build_image_prompt(ImagePromptParts {
            prompt: "x",
            style: Some("vaporwave"),
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn blank_prompt_rejected() {
        assert!(build_image_prompt(ImagePromptParts {
            prompt: "   ",
            ..Default::default()
        })
        .is_err());
    }

    #[test]
    fn persona_prompt_includes_sections_and_user() {
        let prompt = build_persona_prompt(
            Persona {
                name: "Aria",
                personality: Some("Playful and teases {{user}}"),
                appearance: None,
                scenario: Some("  "),
            },
            "sam",
        );
        assert!(prompt.starts_with("You are Aria, a companion chatting with sam."));
        assert!(prompt.contains("Personality: Playful and teases sam"));
        assert!(!prompt.contains("Appearance:"));
        assert!(!prompt.contains("Scenario:"));
    }

    #[test]
    fn context_inserts_greeting_only_for_new_conversations() {
        let ctx = build_chat_context("sys", Some("Hi there!"), &[], "hello", 20);
        assert_eq!(ctx.len(), 3);
        assert_eq!(ctx[1], ChatTurn::new(ChatRole::Assistant, "Hi there!"));
        assert_eq!(ctx[2], ChatTurn::new(ChatRole::User, "hello"));

        let history = vec![ChatTurn::new(ChatRole::User, "earlier")];
        let ctx = build_chat_context("sys", Some("Hi there!"), &history, "hello", 20);
        assert_eq!(ctx.len(), 3);
        assert_eq!(ctx[1].content, "earlier");
    }

    #[test]
    fn context_keeps_only_recent_history() {
        let history: Vec<_> = (0..10)
            .map(|i| ChatTurn::new(ChatRole::User, format!("m{i}")))
            .collect();
        let ctx = build_chat_context("sys", None, &history, "new", 3);
        let contents: Vec<_> = ctx.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["sys", "m7", "m8", "m9", "new"]);
    }
}
