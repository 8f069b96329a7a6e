//! Instruction templates sent to the model and parsers for what comes back.

use firstprompt_common::GenerationError;
use serde::Deserialize;

use crate::providers::{GenerationResult, PromptRequest, TopicRequest};

pub fn topics_instruction(request: &TopicRequest) -> String {
    format!(
        "Please generate a comma separated list of {count} most likely topics a student in grade '{grade}' \
in country '{country}' would study in subject '{subject}'.\n\
You may search the web to find information about what these topics would be.\n\
Ensure the topics are a few words long (1-4).\n\
Output only the comma separated list of topics, nothing else.\n",
        count = request.count,
        grade = request.grade,
        country = request.country,
        subject = request.subject,
    )
}

pub fn prompts_instruction(request: &PromptRequest) -> String {
    format!(
        "Generate {count} most likely prompts a student from {country} in grade {grade} would ask an LLM \
about the topic {topic}.\n\
The prompts should each be 4-7 words long.\n\
Each prompt must start with a relevant emoji.\n\
The prompts should not contain the word please or full stops.\n\
The prompts MUST be in {language}\n\
Output a JSON object with a single key \"suggested_prompts\" holding the list of prompts, nothing else.\n",
        count = request.count,
        country = request.country,
        grade = request.grade,
        topic = request.topic,
        language = request.language,
    )
}

/// Response schema constraining prompt generation to `{"suggested_prompts": [string]}`.
pub fn suggested_prompts_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "OBJECT",
        "properties": {
            "suggested_prompts": {
                "type": "ARRAY",
                "items": { "type": "STRING" }
            }
        },
        "required": ["suggested_prompts"]
    })
}

/// Split a comma separated topic list.
pub fn parse_topics(text: &str, count: usize) -> GenerationResult<Vec<String>> {
    let topics: Vec<String> = text
        .split(',')
        .map(|topic| topic.trim())
        .filter(|topic| !topic.is_empty())
        .take(count)
        .map(str::to_string)
        .collect();

    if topics.is_empty() {
        return Err(GenerationError::EmptyResponse);
    }
    Ok(topics)
}

#[derive(Deserialize)]
struct PromptPayload {
    suggested_prompts: Vec<String>,
}

/// Parse `{"suggested_prompts": [...]}`, tolerating a fenced code block.
pub fn parse_prompts(text: &str, count: usize) -> GenerationResult<Vec<String>> {
    let payload: PromptPayload = serde_json::from_str(strip_code_fence(text))
        .map_err(|e| GenerationError::Malformed(format!("invalid prompt payload: {e}")))?;

    let prompts: Vec<String> = payload
        .suggested_prompts
        .into_iter()
        .map(|prompt| prompt.trim().to_string())
        .filter(|prompt| !prompt.is_empty())
        .take(count)
        .collect();

    if prompts.is_empty() {
        return Err(GenerationError::EmptyResponse);
    }
    Ok(prompts)
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // drop the info string ("json") on the opening fence line
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}
