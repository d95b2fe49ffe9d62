use crate::config::InferenceConfig;
use crate::profiles::UserProfile;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
}

/// One prior turn as sent by the chat client.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub content: String,
    #[serde(default)]
    pub is_user: bool,
}

pub fn format_history(history: &[HistoryEntry]) -> Vec<ConversationMessage> {
    history
        .iter()
        .map(|entry| ConversationMessage {
            role: if entry.is_user {
                Role::User
            } else {
                Role::Assistant
            },
            content: entry.content.clone(),
        })
        .collect()
}

pub fn append_user_turn(
    mut messages: Vec<ConversationMessage>,
    text: impl Into<String>,
) -> Vec<ConversationMessage> {
    messages.push(ConversationMessage {
        role: Role::User,
        content: text.into(),
    });
    messages
}

const BASE_TEMPLATE: &str = "\
You are JomKaya AI Assistant, a specialized AI advisor for Shariah-compliant investments in Malaysia. Your expertise includes:

**Core Responsibilities:**
- Provide guidance on Shariah-compliant investment principles
- Recommend halal investment options in Malaysia
- Explain Islamic finance concepts and screening criteria
- Analyze Malaysian stocks for Shariah compliance
- Suggest portfolio allocations based on Islamic principles

**Key Guidelines:**
- Always prioritize Shariah compliance in recommendations
- Reference the Securities Commission Malaysia's approved lists when relevant
- Explain both opportunities and risks transparently
- Encourage consultation with licensed Islamic financial advisors
- Provide educational content rather than direct financial advice

**Prohibited Areas:**
- Never recommend haram investments (alcohol, gambling, conventional interest-based products)
- Avoid giving specific buy/sell advice
- Don't guarantee returns or outcomes

**Communication Style:**
- Be helpful, professional, and educational
- Use clear explanations for complex concepts
- Use formatting for readability
- Provide practical, actionable guidance";

const MALAY_INSTRUCTION: &str = "\
**Language:**
Respond in Bahasa Melayu. Keep standard financial terms (for example sukuk, REIT, Shariah) where no common Malay equivalent exists.";

const MIRROR_INSTRUCTION: &str = "\
**Language:**
Respond in the same language the user writes in. If the user writes in Bahasa Melayu, answer in Bahasa Melayu; otherwise answer in English.";

const NOT_SPECIFIED: &str = "Not specified";

fn or_not_specified(value: Option<&str>) -> &str {
    value.filter(|v| !v.trim().is_empty()).unwrap_or(NOT_SPECIFIED)
}

fn language_block(language: Option<&str>) -> &'static str {
    match language {
        Some("ms") => MALAY_INSTRUCTION,
        _ => MIRROR_INSTRUCTION,
    }
}

fn profile_block(profile: &UserProfile) -> String {
    let goals = profile
        .investment_goals
        .as_deref()
        .filter(|goals| !goals.is_empty())
        .map(|goals| goals.join(", "))
        .unwrap_or_else(|| NOT_SPECIFIED.to_string());
    format!(
        "**User Profile Context:**\n\
         - Risk Tolerance: {}\n\
         - Investment Experience: {}\n\
         - Time Horizon: {}\n\
         - Investment Goals: {}\n\
         - Liquidity Needs: {}\n\
         \n\
         Tailor your responses to match their profile while maintaining Shariah compliance.",
        or_not_specified(profile.risk_tolerance.as_deref()),
        or_not_specified(profile.investment_experience.as_deref()),
        or_not_specified(profile.time_horizon.as_deref()),
        goals,
        or_not_specified(profile.liquidity_needs.as_deref()),
    )
}

/// Builds the system instruction: fixed template, language block, then the
/// optional profile block, separated by blank lines.
pub fn build_system_prompt(profile: Option<&UserProfile>, language: Option<&str>) -> String {
    let mut prompt = String::from(BASE_TEMPLATE);
    prompt.push_str("\n\n");
    prompt.push_str(language_block(language));
    if let Some(profile) = profile {
        prompt.push_str("\n\n");
        prompt.push_str(&profile_block(profile));
    }
    prompt
}

/// Per-request inputs to the system prompt.
#[derive(Debug, Clone, Default)]
pub struct SystemPromptContext {
    pub profile: Option<UserProfile>,
    pub language: Option<String>,
}

impl SystemPromptContext {
    pub fn render(&self) -> String {
        build_system_prompt(self.profile.as_ref(), self.language.as_deref())
    }
}

pub fn wrap_content(content: &str) -> Value {
    json!([{ "text": content }])
}

pub fn unwrap_content(blocks: &Value) -> Option<&str> {
    blocks.get(0)?.get("text")?.as_str()
}

/// Everything needed for one model invocation.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub messages: Vec<ConversationMessage>,
    pub system: String,
    pub inference: InferenceConfig,
}

impl ModelRequest {
    pub fn new(
        messages: Vec<ConversationMessage>,
        context: &SystemPromptContext,
        inference: InferenceConfig,
    ) -> Self {
        Self {
            messages,
            system: context.render(),
            inference,
        }
    }

    /// Renders the Nova `messages-v1` request body.
    pub fn to_body(&self) -> Value {
        let messages: Vec<Value> = self
            .messages
            .iter()
            .map(|m| json!({ "role": m.role, "content": wrap_content(&m.content) }))
            .collect();
        json!({
            "schemaVersion": "messages-v1",
            "system": wrap_content(&self.system),
            "messages": messages,
            "inferenceConfig": self.inference,
        })
    }
}
