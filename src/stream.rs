//! SSE framing and streaming translation.
//!
//! Upstream bytes are buffered to event boundaries (`\n\n`) before parsing:
//! several providers split JSON payloads across network packets. Complete
//! frames are then fed through a per-direction state machine that re-emits
//! them in the client's wire format. Same-format streams pass through
//! untouched.

use std::collections::HashMap;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures_util::Stream;
use serde_json::json;

use crate::pool::WireFormat;
use crate::translate::anthropic_stop_to_openai;
use crate::wire::{anthropic, openai};

/// Buffers an upstream byte stream so consumers only ever see complete SSE
/// events (terminated by `\n\n`). Whatever remains at end of stream is
/// flushed as-is.
pub struct SseFrameStream<S> {
    inner: S,
    buffer: BytesMut,
}

impl<S> SseFrameStream<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            buffer: BytesMut::new(),
        }
    }
}

impl<S, E> Stream for SseFrameStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    type Item = Result<Bytes, E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        loop {
            if let Some(pos) = this.buffer.windows(2).position(|window| window == b"\n\n") {
                let frame = this.buffer.split_to(pos + 2);
                return Poll::Ready(Some(Ok(frame.freeze())));
            }

            match Pin::new(&mut this.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => {
                    this.buffer.extend_from_slice(&chunk);
                }
                Poll::Ready(Some(Err(e))) => return Poll::Ready(Some(Err(e))),
                Poll::Ready(None) => {
                    if this.buffer.is_empty() {
                        return Poll::Ready(None);
                    }
                    return Poll::Ready(Some(Ok(this.buffer.split().freeze())));
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// `data:` payloads of one SSE frame, in order. `event:` lines and comments
/// are skipped; both `\n` and `\r\n` line endings are accepted.
pub fn data_payloads(frame: &[u8]) -> Vec<String> {
    let text = String::from_utf8_lossy(frame);
    text.lines()
        .filter_map(|line| {
            line.trim_end_matches('\r')
                .strip_prefix("data:")
                .map(|payload| payload.trim().to_string())
        })
        .filter(|payload| !payload.is_empty())
        .collect()
}

fn openai_frame(value: &serde_json::Value) -> Bytes {
    Bytes::from(format!("data: {value}\n\n"))
}

fn anthropic_frame(event: &anthropic::StreamEvent) -> Bytes {
    let value = serde_json::to_value(event).expect("stream event serialises");
    Bytes::from(format!("event: {}\ndata: {}\n\n", event.name(), value))
}

/// Per-dispatch streaming translator. Feed it complete SSE frames; it
/// returns the frames to forward to the client.
pub enum StreamTranslator {
    Passthrough,
    OpenAiToAnthropic(OpenAiToAnthropic),
    AnthropicToOpenAi(AnthropicToOpenAi),
}

impl StreamTranslator {
    pub fn new(from: WireFormat, to: WireFormat, client_model: &str) -> Self {
        match (from, to) {
            (WireFormat::OpenAi, WireFormat::Anthropic) => {
                StreamTranslator::OpenAiToAnthropic(OpenAiToAnthropic::new(client_model))
            }
            (WireFormat::Anthropic, WireFormat::OpenAi) => {
                StreamTranslator::AnthropicToOpenAi(AnthropicToOpenAi::new(client_model))
            }
            _ => StreamTranslator::Passthrough,
        }
    }

    pub fn on_frame(&mut self, frame: &Bytes) -> Vec<Bytes> {
        match self {
            StreamTranslator::Passthrough => vec![frame.clone()],
            StreamTranslator::OpenAiToAnthropic(machine) => frame_fold(frame, |payload| {
                machine.on_payload(payload)
            }),
            StreamTranslator::AnthropicToOpenAi(machine) => frame_fold(frame, |payload| {
                machine.on_payload(payload)
            }),
        }
    }

    /// Flush terminal events once the upstream stream ends.
    pub fn finish(&mut self) -> Vec<Bytes> {
        match self {
            StreamTranslator::Passthrough => Vec::new(),
            StreamTranslator::OpenAiToAnthropic(machine) => machine.finish(),
            StreamTranslator::AnthropicToOpenAi(machine) => machine.finish(),
        }
    }

    /// Token usage observed in the stream, for the attempt log. Passthrough
    /// streams report nothing.
    pub fn token_counts(&self) -> crate::translate::TokenCounts {
        match self {
            StreamTranslator::Passthrough => crate::translate::TokenCounts::default(),
            StreamTranslator::OpenAiToAnthropic(machine) => crate::translate::TokenCounts {
                input: machine.usage.map(|u| u.prompt_tokens as i64),
                output: machine.usage.map(|u| u.completion_tokens as i64),
            },
            StreamTranslator::AnthropicToOpenAi(machine) => crate::translate::TokenCounts {
                input: Some(machine.input_tokens as i64),
                output: Some(machine.output_tokens as i64),
            },
        }
    }
}

fn frame_fold(frame: &Bytes, mut f: impl FnMut(&str) -> Vec<Bytes>) -> Vec<Bytes> {
    data_payloads(frame)
        .iter()
        .flat_map(|payload| f(payload))
        .collect()
}

// ── OpenAI deltas → Anthropic typed events ────────────────────────────

/// Tracks which Anthropic content block is open while collapsing OpenAI
/// `choices[0].delta` chunks into the typed event lifecycle.
pub struct OpenAiToAnthropic {
    client_model: String,
    started: bool,
    message_id: String,
    /// Anthropic block index currently open, if any.
    open_block: Option<u32>,
    text_block: Option<u32>,
    /// OpenAI tool index → Anthropic block index.
    tool_blocks: HashMap<u32, u32>,
    next_block: u32,
    finish_reason: Option<String>,
    usage: Option<openai::Usage>,
    finished: bool,
}

impl OpenAiToAnthropic {
    fn new(client_model: &str) -> Self {
        Self {
            client_model: client_model.to_string(),
            started: false,
            message_id: String::new(),
            open_block: None,
            text_block: None,
            tool_blocks: HashMap::new(),
            next_block: 0,
            finish_reason: None,
            usage: None,
            finished: false,
        }
    }

    fn on_payload(&mut self, payload: &str) -> Vec<Bytes> {
        if payload == "[DONE]" {
            return self.finish();
        }
        let Ok(chunk) = serde_json::from_str::<openai::ChatCompletionChunk>(payload) else {
            return Vec::new();
        };

        let mut out = Vec::new();

        if chunk.usage.is_some() {
            self.usage = chunk.usage;
        }

        let Some(choice) = chunk.choices.first() else {
            return out;
        };

        if !self.started {
            self.started = true;
            self.message_id = if chunk.id.is_empty() {
                "msg_stream".to_string()
            } else {
                chunk.id.clone()
            };
            out.push(anthropic_frame(&anthropic::StreamEvent::MessageStart {
                message: anthropic::MessageStart {
                    id: self.message_id.clone(),
                    r#type: "message".into(),
                    role: "assistant".into(),
                    model: self.client_model.clone(),
                    content: Vec::new(),
                    stop_reason: None,
                    stop_sequence: None,
                    usage: anthropic::Usage::default(),
                },
            }));
        }

        if let Some(text) = &choice.delta.content
            && !text.is_empty()
        {
            out.extend(self.ensure_text_block());
            out.push(anthropic_frame(&anthropic::StreamEvent::ContentBlockDelta {
                index: self.text_block.expect("text block just opened"),
                delta: anthropic::BlockDelta::TextDelta { text: text.clone() },
            }));
        }

        for call in choice.delta.tool_calls.iter().flatten() {
            out.extend(self.on_tool_delta(call));
        }

        if let Some(reason) = &choice.finish_reason {
            self.finish_reason = Some(reason.clone());
        }

        out
    }

    fn ensure_text_block(&mut self) -> Vec<Bytes> {
        let mut out = Vec::new();
        if let Some(index) = self.text_block {
            if self.open_block != Some(index) {
                out.extend(self.close_open_block());
                self.open_block = Some(index);
            }
            return out;
        }
        out.extend(self.close_open_block());
        let index = self.next_block;
        self.next_block += 1;
        self.text_block = Some(index);
        self.open_block = Some(index);
        out.push(anthropic_frame(&anthropic::StreamEvent::ContentBlockStart {
            index,
            content_block: anthropic::ContentBlock::Text { text: String::new() },
        }));
        out
    }

    fn on_tool_delta(&mut self, call: &openai::DeltaToolCall) -> Vec<Bytes> {
        let mut out = Vec::new();

        let block = match self.tool_blocks.get(&call.index) {
            Some(block) => *block,
            None => {
                out.extend(self.close_open_block());
                let block = self.next_block;
                self.next_block += 1;
                self.tool_blocks.insert(call.index, block);
                self.open_block = Some(block);
                out.push(anthropic_frame(&anthropic::StreamEvent::ContentBlockStart {
                    index: block,
                    content_block: anthropic::ContentBlock::ToolUse {
                        id: call.id.clone().unwrap_or_else(|| format!("call_{}", call.index)),
                        name: call
                            .function
                            .as_ref()
                            .and_then(|f| f.name.clone())
                            .unwrap_or_default(),
                        input: json!({}),
                    },
                }));
                block
            }
        };

        if let Some(arguments) = call.function.as_ref().and_then(|f| f.arguments.as_ref())
            && !arguments.is_empty()
        {
            out.push(anthropic_frame(&anthropic::StreamEvent::ContentBlockDelta {
                index: block,
                delta: anthropic::BlockDelta::InputJsonDelta {
                    partial_json: arguments.clone(),
                },
            }));
        }
        out
    }

    fn close_open_block(&mut self) -> Vec<Bytes> {
        match self.open_block.take() {
            Some(index) => vec![anthropic_frame(&anthropic::StreamEvent::ContentBlockStop {
                index,
            })],
            None => Vec::new(),
        }
    }

    fn finish(&mut self) -> Vec<Bytes> {
        if self.finished || !self.started {
            self.finished = true;
            return Vec::new();
        }
        self.finished = true;

        let mut out = self.close_open_block();
        let usage = self.usage.unwrap_or_default();
        out.push(anthropic_frame(&anthropic::StreamEvent::MessageDelta {
            delta: anthropic::MessageDeltaBody {
                stop_reason: Some(
                    crate::translate::openai_finish_to_anthropic(self.finish_reason.as_deref())
                        .to_string(),
                ),
                stop_sequence: None,
            },
            usage: Some(anthropic::Usage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
            }),
        }));
        out.push(anthropic_frame(&anthropic::StreamEvent::MessageStop));
        out
    }
}

// ── Anthropic typed events → OpenAI deltas ────────────────────────────

/// Collapses the typed event lifecycle into incremental `choices[0].delta`
/// chunks sharing one chunk id, closed by `data: [DONE]`.
pub struct AnthropicToOpenAi {
    client_model: String,
    chunk_id: String,
    created: i64,
    /// Anthropic block index → OpenAI tool index.
    tool_indices: HashMap<u32, u32>,
    next_tool_index: u32,
    input_tokens: u64,
    output_tokens: u64,
    stop_reason: Option<String>,
    done: bool,
}

impl AnthropicToOpenAi {
    fn new(client_model: &str) -> Self {
        Self {
            client_model: client_model.to_string(),
            chunk_id: "chatcmpl-stream".to_string(),
            created: chrono::Utc::now().timestamp(),
            tool_indices: HashMap::new(),
            next_tool_index: 0,
            input_tokens: 0,
            output_tokens: 0,
            stop_reason: None,
            done: false,
        }
    }

    fn chunk(&self, delta: serde_json::Value, finish_reason: Option<&str>) -> Bytes {
        openai_frame(&json!({
            "id": self.chunk_id,
            "object": "chat.completion.chunk",
            "created": self.created,
            "model": self.client_model,
            "choices": [{
                "index": 0,
                "delta": delta,
                "finish_reason": finish_reason,
            }],
        }))
    }

    fn on_payload(&mut self, payload: &str) -> Vec<Bytes> {
        let Ok(event) = serde_json::from_str::<anthropic::StreamEvent>(payload) else {
            return Vec::new();
        };

        match event {
            anthropic::StreamEvent::MessageStart { message } => {
                if !message.id.is_empty() {
                    self.chunk_id = message.id;
                }
                self.input_tokens = message.usage.input_tokens;
                vec![self.chunk(json!({"role": "assistant", "content": ""}), None)]
            }
            anthropic::StreamEvent::ContentBlockStart {
                index,
                content_block,
            } => match content_block {
                anthropic::ContentBlock::ToolUse { id, name, .. } => {
                    let tool_index = self.next_tool_index;
                    self.next_tool_index += 1;
                    self.tool_indices.insert(index, tool_index);
                    vec![self.chunk(
                        json!({"tool_calls": [{
                            "index": tool_index,
                            "id": id,
                            "type": "function",
                            "function": {"name": name, "arguments": ""},
                        }]}),
                        None,
                    )]
                }
                _ => Vec::new(),
            },
            anthropic::StreamEvent::ContentBlockDelta { index, delta } => match delta {
                anthropic::BlockDelta::TextDelta { text } => {
                    vec![self.chunk(json!({"content": text}), None)]
                }
                anthropic::BlockDelta::ThinkingDelta { thinking } => {
                    vec![self.chunk(json!({"content": thinking}), None)]
                }
                anthropic::BlockDelta::InputJsonDelta { partial_json } => {
                    let Some(tool_index) = self.tool_indices.get(&index) else {
                        return Vec::new();
                    };
                    vec![self.chunk(
                        json!({"tool_calls": [{
                            "index": tool_index,
                            "function": {"arguments": partial_json},
                        }]}),
                        None,
                    )]
                }
            },
            anthropic::StreamEvent::MessageDelta { delta, usage } => {
                if let Some(reason) = delta.stop_reason {
                    self.stop_reason = Some(reason);
                }
                if let Some(usage) = usage {
                    self.output_tokens = usage.output_tokens;
                }
                Vec::new()
            }
            anthropic::StreamEvent::MessageStop => self.finish(),
            anthropic::StreamEvent::ContentBlockStop { .. } | anthropic::StreamEvent::Ping => {
                Vec::new()
            }
        }
    }

    fn finish(&mut self) -> Vec<Bytes> {
        if self.done {
            return Vec::new();
        }
        self.done = true;

        let finish_reason = anthropic_stop_to_openai(self.stop_reason.as_deref());
        let final_chunk = openai_frame(&json!({
            "id": self.chunk_id,
            "object": "chat.completion.chunk",
            "created": self.created,
            "model": self.client_model,
            "choices": [{"index": 0, "delta": {}, "finish_reason": finish_reason}],
            "usage": {
                "prompt_tokens": self.input_tokens,
                "completion_tokens": self.output_tokens,
                "total_tokens": self.input_tokens + self.output_tokens,
            },
        }));
        vec![final_chunk, Bytes::from_static(b"data: [DONE]\n\n")]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use std::convert::Infallible;

    fn chunks_to_stream(
        chunks: Vec<&'static [u8]>,
    ) -> impl Stream<Item = Result<Bytes, Infallible>> + Unpin {
        futures_util::stream::iter(chunks.into_iter().map(|c| Ok(Bytes::from_static(c))))
    }

    fn feed(translator: &mut StreamTranslator, frames: &[&str]) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for frame in frames {
            let frame = Bytes::from(format!("{frame}\n\n"));
            out.extend(
                translator
                    .on_frame(&frame)
                    .iter()
                    .map(|b| String::from_utf8_lossy(b).to_string()),
            );
        }
        out.extend(
            translator
                .finish()
                .iter()
                .map(|b| String::from_utf8_lossy(b).to_string()),
        );
        out
    }

    fn payloads(frames: &[String]) -> Vec<serde_json::Value> {
        frames
            .iter()
            .flat_map(|frame| data_payloads(frame.as_bytes()))
            .filter(|p| p != "[DONE]")
            .map(|p| serde_json::from_str(&p).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn frame_stream_joins_split_events() {
        let chunks = vec![
            b"data: {\"del".as_slice(),
            b"ta\": 1}\n\ndata: second".as_slice(),
            b"\n\n".as_slice(),
        ];
        let stream = SseFrameStream::new(chunks_to_stream(chunks));
        let frames: Vec<_> = stream.collect().await;

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].as_ref().unwrap().as_ref(), b"data: {\"delta\": 1}\n\n");
        assert_eq!(frames[1].as_ref().unwrap().as_ref(), b"data: second\n\n");
    }

    #[tokio::test]
    async fn frame_stream_flushes_trailing_partial_at_eof() {
        let chunks = vec![b"data: incomplete".as_slice()];
        let stream = SseFrameStream::new(chunks_to_stream(chunks));
        let frames: Vec<_> = stream.collect().await;
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_ref().unwrap().as_ref(), b"data: incomplete");
    }

    #[test]
    fn data_payloads_skip_event_lines_and_crlf() {
        let frame = b"event: content_block_delta\r\ndata: {\"a\":1}\r\n\r\n";
        assert_eq!(data_payloads(frame), vec!["{\"a\":1}".to_string()]);
    }

    #[test]
    fn openai_stream_becomes_anthropic_event_lifecycle() {
        let mut translator =
            StreamTranslator::new(WireFormat::OpenAi, WireFormat::Anthropic, "sonnet");
        let frames = feed(
            &mut translator,
            &[
                r#"data: {"id":"chatcmpl-1","object":"chat.completion.chunk","created":0,"model":"gpt-4o","choices":[{"index":0,"delta":{"role":"assistant","content":""},"finish_reason":null}]}"#,
                r#"data: {"id":"chatcmpl-1","object":"chat.completion.chunk","created":0,"model":"gpt-4o","choices":[{"index":0,"delta":{"content":"Hel"},"finish_reason":null}]}"#,
                r#"data: {"id":"chatcmpl-1","object":"chat.completion.chunk","created":0,"model":"gpt-4o","choices":[{"index":0,"delta":{"content":"lo"},"finish_reason":null}]}"#,
                r#"data: {"id":"chatcmpl-1","object":"chat.completion.chunk","created":0,"model":"gpt-4o","choices":[{"index":0,"delta":{},"finish_reason":"stop"}],"usage":{"prompt_tokens":3,"completion_tokens":2,"total_tokens":5}}"#,
                "data: [DONE]",
            ],
        );

        let events = payloads(&frames);
        let kinds: Vec<&str> = events
            .iter()
            .map(|e| e["type"].as_str().unwrap())
            .collect();
        assert_eq!(
            kinds,
            [
                "message_start",
                "content_block_start",
                "content_block_delta",
                "content_block_delta",
                "content_block_stop",
                "message_delta",
                "message_stop",
            ]
        );

        // Concatenated text survives intact.
        let text: String = events
            .iter()
            .filter(|e| e["type"] == "content_block_delta")
            .map(|e| e["delta"]["text"].as_str().unwrap())
            .collect();
        assert_eq!(text, "Hello");

        let message_delta = &events[5];
        assert_eq!(message_delta["delta"]["stop_reason"], "end_turn");
        assert_eq!(message_delta["usage"]["output_tokens"], 2);
        assert_eq!(events[0]["message"]["model"], "sonnet");
    }

    #[test]
    fn openai_tool_deltas_open_tool_use_blocks() {
        let mut translator =
            StreamTranslator::new(WireFormat::OpenAi, WireFormat::Anthropic, "haiku");
        let frames = feed(
            &mut translator,
            &[
                r#"data: {"id":"chatcmpl-2","object":"chat.completion.chunk","created":0,"model":"gpt-4o","choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"id":"call_1","type":"function","function":{"name":"calc","arguments":""}}]},"finish_reason":null}]}"#,
                r#"data: {"id":"chatcmpl-2","object":"chat.completion.chunk","created":0,"model":"gpt-4o","choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"expr\":"}}]},"finish_reason":null}]}"#,
                r#"data: {"id":"chatcmpl-2","object":"chat.completion.chunk","created":0,"model":"gpt-4o","choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"function":{"arguments":"\"2+2\"}"}}]},"finish_reason":null}]}"#,
                r#"data: {"id":"chatcmpl-2","object":"chat.completion.chunk","created":0,"model":"gpt-4o","choices":[{"index":0,"delta":{},"finish_reason":"tool_calls"}]}"#,
                "data: [DONE]",
            ],
        );

        let events = payloads(&frames);
        let start = events
            .iter()
            .find(|e| e["type"] == "content_block_start")
            .unwrap();
        assert_eq!(start["content_block"]["type"], "tool_use");
        assert_eq!(start["content_block"]["id"], "call_1");
        assert_eq!(start["content_block"]["name"], "calc");

        let arguments: String = events
            .iter()
            .filter(|e| e["type"] == "content_block_delta")
            .map(|e| e["delta"]["partial_json"].as_str().unwrap())
            .collect();
        assert_eq!(arguments, r#"{"expr":"2+2"}"#);

        let message_delta = events
            .iter()
            .find(|e| e["type"] == "message_delta")
            .unwrap();
        assert_eq!(message_delta["delta"]["stop_reason"], "tool_use");
    }

    #[test]
    fn anthropic_stream_becomes_openai_chunks_with_done() {
        let mut translator =
            StreamTranslator::new(WireFormat::Anthropic, WireFormat::OpenAi, "opus");
        let frames = feed(
            &mut translator,
            &[
                r#"event: message_start
data: {"type":"message_start","message":{"id":"msg_7","type":"message","role":"assistant","model":"claude-opus-4","content":[],"stop_reason":null,"stop_sequence":null,"usage":{"input_tokens":9,"output_tokens":0}}}"#,
                r#"event: content_block_start
data: {"type":"content_block_start","index":0,"content_block":{"type":"text","text":""}}"#,
                r#"event: content_block_delta
data: {"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hi "}}"#,
                r#"event: content_block_delta
data: {"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"there"}}"#,
                r#"event: content_block_stop
data: {"type":"content_block_stop","index":0}"#,
                r#"event: message_delta
data: {"type":"message_delta","delta":{"stop_reason":"end_turn","stop_sequence":null},"usage":{"output_tokens":4}}"#,
                r#"event: message_stop
data: {"type":"message_stop"}"#,
            ],
        );

        // Closed with [DONE].
        assert!(frames.last().unwrap().contains("[DONE]"));

        let chunks = payloads(&frames);
        // One constant chunk id across the stream.
        let ids: std::collections::HashSet<&str> = chunks
            .iter()
            .map(|c| c["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids.len(), 1);
        assert!(ids.contains("msg_7"));

        let text: String = chunks
            .iter()
            .filter_map(|c| c["choices"][0]["delta"]["content"].as_str())
            .collect();
        assert_eq!(text, "Hi there");

        let last = chunks.last().unwrap();
        assert_eq!(last["choices"][0]["finish_reason"], "stop");
        assert_eq!(last["usage"]["prompt_tokens"], 9);
        assert_eq!(last["usage"]["completion_tokens"], 4);
        assert_eq!(last["model"], "opus");
    }

    #[test]
    fn anthropic_tool_stream_preserves_argument_fragments() {
        let mut translator =
            StreamTranslator::new(WireFormat::Anthropic, WireFormat::OpenAi, "haiku");
        let frames = feed(
            &mut translator,
            &[
                r#"data: {"type":"message_start","message":{"id":"msg_9","type":"message","role":"assistant","model":"claude-haiku","content":[],"stop_reason":null,"stop_sequence":null,"usage":{"input_tokens":5,"output_tokens":0}}}"#,
                r#"data: {"type":"content_block_start","index":0,"content_block":{"type":"tool_use","id":"toolu_1","name":"get_weather","input":{}}}"#,
                r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"input_json_delta","partial_json":"{\"city\":"}}"#,
                r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"input_json_delta","partial_json":"\"Oslo\"}"}}"#,
                r#"data: {"type":"content_block_stop","index":0}"#,
                r#"data: {"type":"message_delta","delta":{"stop_reason":"tool_use","stop_sequence":null},"usage":{"output_tokens":8}}"#,
                r#"data: {"type":"message_stop"}"#,
            ],
        );

        let chunks = payloads(&frames);
        let opener = chunks
            .iter()
            .find(|c| c["choices"][0]["delta"]["tool_calls"][0]["id"] == "toolu_1")
            .unwrap();
        assert_eq!(
            opener["choices"][0]["delta"]["tool_calls"][0]["function"]["name"],
            "get_weather"
        );

        let arguments: String = chunks
            .iter()
            .filter_map(|c| {
                c["choices"][0]["delta"]["tool_calls"][0]["function"]["arguments"].as_str()
            })
            .collect();
        assert_eq!(arguments, r#"{"city":"Oslo"}"#);

        assert_eq!(
            chunks.last().unwrap()["choices"][0]["finish_reason"],
            "tool_calls"
        );
    }

    #[test]
    fn passthrough_leaves_frames_untouched() {
        let mut translator =
            StreamTranslator::new(WireFormat::OpenAi, WireFormat::OpenAi, "sonnet");
        let frame = Bytes::from_static(b"data: {\"anything\": true}\n\n");
        assert_eq!(translator.on_frame(&frame), vec![frame.clone()]);
        assert!(translator.finish().is_empty());
    }

    #[test]
    fn stream_end_without_done_still_terminates_the_message() {
        let mut translator =
            StreamTranslator::new(WireFormat::OpenAi, WireFormat::Anthropic, "sonnet");
        let frames = feed(
            &mut translator,
            &[
                r#"data: {"id":"chatcmpl-3","object":"chat.completion.chunk","created":0,"model":"gpt-4o","choices":[{"index":0,"delta":{"content":"partial"},"finish_reason":null}]}"#,
            ],
        );
        let events = payloads(&frames);
        let kinds: Vec<&str> = events
            .iter()
            .map(|e| e["type"].as_str().unwrap())
            .collect();
        assert_eq!(kinds.last(), Some(&"message_stop"));
    }
}
