//! Bidirectional OpenAI ↔ Anthropic conversion for requests and
//! non-streaming responses.
//!
//! When the client and provider speak the same format, conversion is a no-op
//! that only rewrites the `model` field. Streaming conversion lives in
//! `crate::stream`.

use serde_json::{Value, json};

use crate::errors::GatewayError;
use crate::pool::WireFormat;
use crate::wire::{anthropic, openai};

/// A parsed inbound request, tagged by the client's wire format.
#[derive(Debug, Clone)]
pub enum ClientRequest {
    OpenAi(openai::ChatCompletionRequest),
    Anthropic(anthropic::MessagesRequest),
}

impl ClientRequest {
    pub fn parse(format: WireFormat, body: &[u8]) -> Result<Self, serde_json::Error> {
        Ok(match format {
            WireFormat::OpenAi => ClientRequest::OpenAi(serde_json::from_slice(body)?),
            WireFormat::Anthropic => ClientRequest::Anthropic(serde_json::from_slice(body)?),
        })
    }

    pub fn format(&self) -> WireFormat {
        match self {
            ClientRequest::OpenAi(_) => WireFormat::OpenAi,
            ClientRequest::Anthropic(_) => WireFormat::Anthropic,
        }
    }

    pub fn model(&self) -> &str {
        match self {
            ClientRequest::OpenAi(request) => &request.model,
            ClientRequest::Anthropic(request) => &request.model,
        }
    }

    pub fn stream(&self) -> bool {
        match self {
            ClientRequest::OpenAi(request) => request.stream.unwrap_or(false),
            ClientRequest::Anthropic(request) => request.stream.unwrap_or(false),
        }
    }
}

/// Token counts pulled out of a response for the attempt log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenCounts {
    pub input: Option<i64>,
    pub output: Option<i64>,
}

/// Serialises the request in the provider's wire format with the upstream
/// model id substituted.
pub fn upstream_request_body(
    request: &ClientRequest,
    target_format: WireFormat,
    target_model: &str,
) -> Result<Vec<u8>, GatewayError> {
    let value = match (request, target_format) {
        (ClientRequest::OpenAi(req), WireFormat::OpenAi) => {
            let mut req = req.clone();
            req.model = target_model.to_string();
            serde_json::to_value(&req)
        }
        (ClientRequest::Anthropic(req), WireFormat::Anthropic) => {
            let mut req = req.clone();
            req.model = target_model.to_string();
            serde_json::to_value(&req)
        }
        (ClientRequest::OpenAi(req), WireFormat::Anthropic) => {
            serde_json::to_value(openai_to_anthropic_request(req, target_model)?)
        }
        (ClientRequest::Anthropic(req), WireFormat::OpenAi) => {
            serde_json::to_value(anthropic_to_openai_request(req, target_model)?)
        }
    }
    .map_err(|e| GatewayError::Translation(e.to_string()))?;

    serde_json::to_vec(&value).map_err(|e| GatewayError::Translation(e.to_string()))
}

/// Converts a non-streaming upstream body to the client's format, returning
/// the response value plus token counts for the log. Same-format responses
/// pass through unchanged.
pub fn translate_response(
    body: &[u8],
    from: WireFormat,
    to: WireFormat,
    original_model: &str,
) -> Result<(Value, TokenCounts), GatewayError> {
    match (from, to) {
        (WireFormat::OpenAi, WireFormat::OpenAi) => {
            let value: Value = serde_json::from_slice(body)
                .map_err(|e| GatewayError::UpstreamMalformed(e.to_string()))?;
            let counts = openai_token_counts(&value);
            Ok((value, counts))
        }
        (WireFormat::Anthropic, WireFormat::Anthropic) => {
            let value: Value = serde_json::from_slice(body)
                .map_err(|e| GatewayError::UpstreamMalformed(e.to_string()))?;
            let counts = anthropic_token_counts(&value);
            Ok((value, counts))
        }
        (WireFormat::OpenAi, WireFormat::Anthropic) => {
            let response: openai::ChatCompletionResponse = serde_json::from_slice(body)
                .map_err(|e| GatewayError::UpstreamMalformed(e.to_string()))?;
            let converted = openai_to_anthropic_response(&response, original_model);
            let counts = TokenCounts {
                input: Some(converted.usage.input_tokens as i64),
                output: Some(converted.usage.output_tokens as i64),
            };
            let value = serde_json::to_value(converted)
                .map_err(|e| GatewayError::UpstreamMalformed(e.to_string()))?;
            Ok((value, counts))
        }
        (WireFormat::Anthropic, WireFormat::OpenAi) => {
            let response: anthropic::MessagesResponse = serde_json::from_slice(body)
                .map_err(|e| GatewayError::UpstreamMalformed(e.to_string()))?;
            let converted = anthropic_to_openai_response(&response, original_model);
            let counts = converted
                .usage
                .map(|usage| TokenCounts {
                    input: Some(usage.prompt_tokens as i64),
                    output: Some(usage.completion_tokens as i64),
                })
                .unwrap_or_default();
            let value = serde_json::to_value(converted)
                .map_err(|e| GatewayError::UpstreamMalformed(e.to_string()))?;
            Ok((value, counts))
        }
    }
}

fn openai_token_counts(value: &Value) -> TokenCounts {
    TokenCounts {
        input: value["usage"]["prompt_tokens"].as_i64(),
        output: value["usage"]["completion_tokens"].as_i64(),
    }
}

fn anthropic_token_counts(value: &Value) -> TokenCounts {
    TokenCounts {
        input: value["usage"]["input_tokens"].as_i64(),
        output: value["usage"]["output_tokens"].as_i64(),
    }
}

// ── Requests ──────────────────────────────────────────────────────────

pub fn openai_to_anthropic_request(
    request: &openai::ChatCompletionRequest,
    target_model: &str,
) -> Result<anthropic::MessagesRequest, GatewayError> {
    let mut system_parts: Vec<String> = Vec::new();
    let mut messages: Vec<anthropic::Message> = Vec::new();

    for message in &request.messages {
        match message.role.as_str() {
            "system" | "developer" => {
                if let Some(content) = &message.content {
                    system_parts.push(content.flat_text());
                }
            }
            "user" => {
                let content = user_content_to_anthropic(message.content.as_ref())?;
                push_merged(&mut messages, "user", content);
            }
            "assistant" => {
                let mut blocks: Vec<anthropic::ContentBlock> = Vec::new();
                if let Some(content) = &message.content {
                    let text = content.flat_text();
                    if !text.is_empty() {
                        blocks.push(anthropic::ContentBlock::Text { text });
                    }
                }
                for call in message.tool_calls.iter().flatten() {
                    blocks.push(anthropic::ContentBlock::ToolUse {
                        id: call.id.clone(),
                        name: call.function.name.clone(),
                        input: parse_arguments(&call.function.arguments),
                    });
                }
                if blocks.is_empty() {
                    blocks.push(anthropic::ContentBlock::Text { text: String::new() });
                }
                push_merged(&mut messages, "assistant", blocks);
            }
            "tool" => {
                let tool_use_id = message.tool_call_id.clone().ok_or_else(|| {
                    GatewayError::Translation("tool message without tool_call_id".into())
                })?;
                let content = message
                    .content
                    .as_ref()
                    .map(|c| Value::String(c.flat_text()));
                push_merged(
                    &mut messages,
                    "user",
                    vec![anthropic::ContentBlock::ToolResult {
                        tool_use_id,
                        content,
                        is_error: None,
                    }],
                );
            }
            other => {
                return Err(GatewayError::Translation(format!(
                    "unsupported message role \"{other}\""
                )));
            }
        }
    }

    let system = if system_parts.is_empty() {
        None
    } else {
        Some(anthropic::SystemPrompt::Text(system_parts.join("\n")))
    };

    let tools = request.tools.as_ref().map(|tools| {
        tools
            .iter()
            .map(|tool| anthropic::Tool {
                name: tool.function.name.clone(),
                description: tool.function.description.clone(),
                input_schema: tool.function.parameters.clone().unwrap_or_else(|| json!({})),
            })
            .collect()
    });

    let tool_choice = match request.tool_choice.as_ref() {
        None => None,
        Some(value) => Some(openai_tool_choice_to_anthropic(value)?),
    };

    Ok(anthropic::MessagesRequest {
        model: target_model.to_string(),
        messages,
        max_tokens: request.max_tokens.unwrap_or(4096),
        system,
        temperature: request.temperature,
        top_p: request.top_p,
        stop_sequences: request.stop.clone().map(|stop| stop.into_list()),
        stream: request.stream,
        tools,
        tool_choice,
        metadata: None,
    })
}

pub fn anthropic_to_openai_request(
    request: &anthropic::MessagesRequest,
    target_model: &str,
) -> Result<openai::ChatCompletionRequest, GatewayError> {
    let mut messages: Vec<openai::ChatMessage> = Vec::new();

    if let Some(system) = &request.system {
        messages.push(openai::ChatMessage::text("system", system.flat_text()));
    }

    for message in &request.messages {
        match message.role.as_str() {
            "user" => {
                let blocks = message.content.clone().into_blocks();
                let mut parts: Vec<openai::ContentPart> = Vec::new();
                for block in blocks {
                    match block {
                        anthropic::ContentBlock::ToolResult {
                            tool_use_id,
                            content,
                            ..
                        } => {
                            // A tool result becomes its own `tool` message.
                            messages.push(openai::ChatMessage {
                                role: "tool".into(),
                                content: Some(openai::MessageContent::Text(
                                    tool_result_text(content),
                                )),
                                tool_calls: None,
                                tool_call_id: Some(tool_use_id),
                                name: None,
                            });
                        }
                        anthropic::ContentBlock::Text { text } => {
                            parts.push(openai::ContentPart::Text { text });
                        }
                        anthropic::ContentBlock::Thinking { thinking, .. } => {
                            parts.push(openai::ContentPart::Text { text: thinking });
                        }
                        anthropic::ContentBlock::Image { source } => {
                            parts.push(openai::ContentPart::ImageUrl {
                                image_url: openai::ImageUrl {
                                    url: image_source_to_url(&source),
                                    detail: None,
                                },
                            });
                        }
                        anthropic::ContentBlock::ToolUse { .. } => {
                            return Err(GatewayError::Translation(
                                "tool_use block in a user message".into(),
                            ));
                        }
                    }
                }
                if !parts.is_empty() {
                    let content = if parts.len() == 1
                        && let openai::ContentPart::Text { text } = &parts[0]
                    {
                        openai::MessageContent::Text(text.clone())
                    } else {
                        openai::MessageContent::Parts(parts)
                    };
                    messages.push(openai::ChatMessage {
                        role: "user".into(),
                        content: Some(content),
                        tool_calls: None,
                        tool_call_id: None,
                        name: None,
                    });
                }
            }
            "assistant" => {
                let blocks = message.content.clone().into_blocks();
                let mut text = String::new();
                let mut tool_calls: Vec<openai::ToolCall> = Vec::new();
                for block in blocks {
                    match block {
                        anthropic::ContentBlock::Text { text: t } => text.push_str(&t),
                        anthropic::ContentBlock::Thinking { thinking, .. } => {
                            text.push_str(&thinking)
                        }
                        anthropic::ContentBlock::ToolUse { id, name, input } => {
                            tool_calls.push(openai::ToolCall {
                                id,
                                r#type: "function".into(),
                                function: openai::FunctionCall {
                                    name,
                                    arguments: input.to_string(),
                                },
                            });
                        }
                        other => {
                            return Err(GatewayError::Translation(format!(
                                "unsupported assistant block {other:?}"
                            )));
                        }
                    }
                }
                messages.push(openai::ChatMessage {
                    role: "assistant".into(),
                    content: if text.is_empty() {
                        None
                    } else {
                        Some(openai::MessageContent::Text(text))
                    },
                    tool_calls: if tool_calls.is_empty() {
                        None
                    } else {
                        Some(tool_calls)
                    },
                    tool_call_id: None,
                    name: None,
                });
            }
            other => {
                return Err(GatewayError::Translation(format!(
                    "unsupported message role \"{other}\""
                )));
            }
        }
    }

    let tools = request.tools.as_ref().map(|tools| {
        tools
            .iter()
            .map(|tool| openai::Tool {
                r#type: "function".into(),
                function: openai::FunctionDef {
                    name: tool.name.clone(),
                    description: tool.description.clone(),
                    parameters: Some(tool.input_schema.clone()),
                },
            })
            .collect()
    });

    let tool_choice = request.tool_choice.as_ref().map(|choice| match choice {
        anthropic::ToolChoice::Auto => json!("auto"),
        anthropic::ToolChoice::None => json!("none"),
        anthropic::ToolChoice::Any => json!("required"),
        anthropic::ToolChoice::Tool { name } => {
            json!({"type": "function", "function": {"name": name}})
        }
    });

    Ok(openai::ChatCompletionRequest {
        model: target_model.to_string(),
        messages,
        max_tokens: Some(request.max_tokens),
        temperature: request.temperature,
        top_p: request.top_p,
        stop: request
            .stop_sequences
            .clone()
            .map(openai::StopSequence::Many),
        stream: request.stream,
        tools,
        tool_choice,
        user: None,
    })
}

/// Appends blocks, merging into the previous message when the role repeats
/// (the Anthropic API requires alternating roles).
fn push_merged(
    messages: &mut Vec<anthropic::Message>,
    role: &str,
    blocks: Vec<anthropic::ContentBlock>,
) {
    if let Some(last) = messages.last_mut()
        && last.role == role
    {
        let mut merged = std::mem::replace(
            &mut last.content,
            anthropic::MessageContent::Text(String::new()),
        )
        .into_blocks();
        merged.extend(blocks);
        last.content = anthropic::MessageContent::Blocks(merged);
        return;
    }
    messages.push(anthropic::Message {
        role: role.to_string(),
        content: anthropic::MessageContent::Blocks(blocks),
    });
}

fn user_content_to_anthropic(
    content: Option<&openai::MessageContent>,
) -> Result<Vec<anthropic::ContentBlock>, GatewayError> {
    let Some(content) = content else {
        return Ok(vec![anthropic::ContentBlock::Text { text: String::new() }]);
    };
    match content {
        openai::MessageContent::Text(text) => {
            Ok(vec![anthropic::ContentBlock::Text { text: text.clone() }])
        }
        openai::MessageContent::Parts(parts) => {
            let mut blocks = Vec::new();
            for part in parts {
                match part {
                    openai::ContentPart::Text { text } => {
                        blocks.push(anthropic::ContentBlock::Text { text: text.clone() });
                    }
                    openai::ContentPart::ImageUrl { image_url } => {
                        blocks.push(anthropic::ContentBlock::Image {
                            source: url_to_image_source(&image_url.url),
                        });
                    }
                }
            }
            if blocks.is_empty() {
                blocks.push(anthropic::ContentBlock::Text { text: String::new() });
            }
            Ok(blocks)
        }
    }
}

/// `data:media/type;base64,...` URLs become inline base64 sources; anything
/// else is referenced by URL.
fn url_to_image_source(url: &str) -> anthropic::ImageSource {
    if let Some(rest) = url.strip_prefix("data:")
        && let Some((header, data)) = rest.split_once(',')
    {
        let media_type = header.trim_end_matches(";base64");
        return anthropic::ImageSource {
            r#type: "base64".into(),
            media_type: Some(media_type.to_string()),
            data: Some(data.to_string()),
            url: None,
        };
    }
    anthropic::ImageSource {
        r#type: "url".into(),
        media_type: None,
        data: None,
        url: Some(url.to_string()),
    }
}

fn image_source_to_url(source: &anthropic::ImageSource) -> String {
    if source.r#type == "base64" {
        format!(
            "data:{};base64,{}",
            source.media_type.as_deref().unwrap_or("image/png"),
            source.data.as_deref().unwrap_or("")
        )
    } else {
        source.url.clone().unwrap_or_default()
    }
}

fn tool_result_text(content: Option<Value>) -> String {
    match content {
        None => String::new(),
        Some(Value::String(text)) => text,
        // Block lists flatten to their text; anything else is re-encoded.
        Some(Value::Array(blocks)) => blocks
            .iter()
            .filter_map(|block| block["text"].as_str())
            .collect::<Vec<_>>()
            .join(""),
        Some(other) => other.to_string(),
    }
}

fn parse_arguments(arguments: &str) -> Value {
    if arguments.trim().is_empty() {
        return json!({});
    }
    serde_json::from_str(arguments).unwrap_or_else(|_| Value::String(arguments.to_string()))
}

fn openai_tool_choice_to_anthropic(value: &Value) -> Result<anthropic::ToolChoice, GatewayError> {
    match value {
        Value::String(s) => match s.as_str() {
            "auto" => Ok(anthropic::ToolChoice::Auto),
            "none" => Ok(anthropic::ToolChoice::None),
            "required" => Ok(anthropic::ToolChoice::Any),
            other => Err(GatewayError::Translation(format!(
                "unsupported tool_choice \"{other}\""
            ))),
        },
        Value::Object(_) => {
            let name = value["function"]["name"].as_str().ok_or_else(|| {
                GatewayError::Translation("tool_choice object without function.name".into())
            })?;
            Ok(anthropic::ToolChoice::Tool { name: name.to_string() })
        }
        _ => Err(GatewayError::Translation("unsupported tool_choice".into())),
    }
}

// ── Responses ─────────────────────────────────────────────────────────

pub fn openai_finish_to_anthropic(reason: Option<&str>) -> &'static str {
    match reason {
        Some("length") => "max_tokens",
        Some("tool_calls") => "tool_use",
        Some("content_filter") => "stop_sequence",
        _ => "end_turn",
    }
}

pub fn anthropic_stop_to_openai(reason: Option<&str>) -> &'static str {
    match reason {
        Some("max_tokens") => "length",
        Some("tool_use") => "tool_calls",
        Some("stop_sequence") => "content_filter",
        _ => "stop",
    }
}

pub fn openai_to_anthropic_response(
    response: &openai::ChatCompletionResponse,
    original_model: &str,
) -> anthropic::MessagesResponse {
    let mut content: Vec<anthropic::ContentBlock> = Vec::new();
    let mut finish_reason = None;

    if let Some(choice) = response.choices.first() {
        if let Some(text) = &choice.message.content
            && !text.is_empty()
        {
            content.push(anthropic::ContentBlock::Text { text: text.clone() });
        }
        for call in choice.message.tool_calls.iter().flatten() {
            content.push(anthropic::ContentBlock::ToolUse {
                id: call.id.clone(),
                name: call.function.name.clone(),
                input: parse_arguments(&call.function.arguments),
            });
        }
        finish_reason = choice.finish_reason.clone();
    }

    let usage = response.usage.unwrap_or_default();
    anthropic::MessagesResponse {
        id: response.id.clone(),
        r#type: "message".into(),
        role: "assistant".into(),
        model: original_model.to_string(),
        content,
        stop_reason: Some(openai_finish_to_anthropic(finish_reason.as_deref()).to_string()),
        stop_sequence: None,
        usage: anthropic::Usage {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
        },
    }
}

pub fn anthropic_to_openai_response(
    response: &anthropic::MessagesResponse,
    original_model: &str,
) -> openai::ChatCompletionResponse {
    let mut text = String::new();
    let mut tool_calls: Vec<openai::ToolCall> = Vec::new();

    for block in &response.content {
        match block {
            anthropic::ContentBlock::Text { text: t } => text.push_str(t),
            anthropic::ContentBlock::Thinking { thinking, .. } => text.push_str(thinking),
            anthropic::ContentBlock::ToolUse { id, name, input } => {
                tool_calls.push(openai::ToolCall {
                    id: id.clone(),
                    r#type: "function".into(),
                    function: openai::FunctionCall {
                        name: name.clone(),
                        arguments: input.to_string(),
                    },
                });
            }
            _ => {}
        }
    }

    openai::ChatCompletionResponse {
        id: response.id.clone(),
        object: "chat.completion".into(),
        created: chrono::Utc::now().timestamp(),
        model: original_model.to_string(),
        choices: vec![openai::Choice {
            index: 0,
            message: openai::AssistantMessage {
                role: "assistant".into(),
                content: if text.is_empty() { None } else { Some(text) },
                tool_calls: if tool_calls.is_empty() {
                    None
                } else {
                    Some(tool_calls)
                },
            },
            finish_reason: Some(
                anthropic_stop_to_openai(response.stop_reason.as_deref()).to_string(),
            ),
        }],
        usage: Some(openai::Usage {
            prompt_tokens: response.usage.input_tokens,
            completion_tokens: response.usage.output_tokens,
            total_tokens: response.usage.input_tokens + response.usage.output_tokens,
        }),
    }
}
