//! Responses → Chat, non-streaming (spec.md §4.5.3).
//!
//! The upstream body for a non-streaming Responses call is still an SSE
//! blob; the caller only needs the single `response.completed` line.

use serde_json::{Value, json};

use crate::error::{Error, Result};
use crate::sse::parse_sse_events;
use crate::tool_names::ToolNameMap;

/// Scan `sse_body` for the `response.completed` event and compose a
/// `chat.completion` object from its `response` payload.
///
/// Returns [`Error::Malformed`] (spec.md §7 MalformedTranslation) if no
/// such event is present; the dispatcher turns that into
/// `{"error":"invalid_upstream_response"}`.
pub fn responses_to_chat(sse_body: &str, tool_map: &ToolNameMap) -> Result<Value> {
    let response = parse_sse_events(sse_body)?
        .into_iter()
        .find(|event| event.get("type").and_then(Value::as_str) == Some("response.completed"))
        .and_then(|event| event.get("response").cloned())
        .ok_or_else(|| Error::Malformed("no response.completed event in upstream SSE body".into()))?;

    Ok(compose_chat_completion(&response, tool_map))
}

fn compose_chat_completion(response: &Value, tool_map: &ToolNameMap) -> Value {
    let id = response.get("id").cloned().unwrap_or(Value::Null);
    let created = response.get("created_at").cloned().unwrap_or(Value::Null);
    let model = response.get("model").cloned().unwrap_or(Value::Null);

    let usage = response.get("usage").map(|u| {
        json!({
            "prompt_tokens": u.get("input_tokens"),
            "completion_tokens": u.get("output_tokens"),
            "total_tokens": u.get("total_tokens"),
            "completion_tokens_details": {
                "reasoning_tokens": u.get("output_tokens_details").and_then(|d| d.get("reasoning_tokens")),
            },
        })
    });

    let mut content = String::new();
    let mut reasoning_content = String::new();
    let mut tool_calls = Vec::new();

    for item in response.get("output").and_then(Value::as_array).into_iter().flatten() {
        match item.get("type").and_then(Value::as_str) {
            Some("reasoning") => {
                if let Some(summary) = item.get("summary_text").and_then(Value::as_str) {
                    reasoning_content.push_str(summary);
                }
            }
            Some("message") => {
                if let Some(text) = first_output_text(item) {
                    content.push_str(text);
                }
            }
            Some("function_call") => {
                let name = item.get("name").and_then(Value::as_str).unwrap_or_default();
                tool_calls.push(json!({
                    "id": item.get("call_id"),
                    "type": "function",
                    "function": {
                        "name": tool_map.lengthen(name),
                        "arguments": item.get("arguments"),
                    },
                }));
            }
            _ => {}
        }
    }

    let finish_reason = if tool_calls.is_empty() { "stop" } else { "tool_calls" };

    let mut message = serde_json::Map::new();
    message.insert("role".into(), json!("assistant"));
    message.insert("content".into(), json!(content));
    if !reasoning_content.is_empty() {
        message.insert("reasoning_content".into(), json!(reasoning_content));
    }
    if !tool_calls.is_empty() {
        message.insert("tool_calls".into(), json!(tool_calls));
    }

    json!({
        "id": id,
        "object": "chat.completion",
        "created": created,
        "model": model,
        "choices": [{
            "index": 0,
            "message": message,
            "finish_reason": finish_reason,
            "native_finish_reason": finish_reason,
        }],
        "usage": usage,
    })
}

fn first_output_text(message_item: &Value) -> Option<&str> {
    message_item
        .get("content")
        .and_then(Value::as_array)?
        .iter()
        .find(|part| part.get("type").and_then(Value::as_str) == Some("output_text"))
        .and_then(|part| part.get("text"))
        .and_then(Value::as_str)
}
