//! Chat-Completions → Responses (spec.md §4.5.2).
//!
//! Operates on `serde_json::Value` directly: both wire dialects are
//! loosely-typed JSON objects and the conversion is a pure reshaping with
//! no validation responsibility of its own (malformed caller input is
//! forwarded as best-effort rather than rejected, consistent with the rest
//! of the proxy's passthrough posture).

use serde_json::{Value, json};

use crate::tool_names::ToolNameMap;

const GPT5_VARIANTS: &[(&str, &str)] = &[
    ("gpt-5-minimal", "minimal"),
    ("gpt-5-low", "low"),
    ("gpt-5-medium", "medium"),
    ("gpt-5-high", "high"),
];

/// Convert one Chat-Completions request body into a Responses request body.
///
/// `tool_map` is built by the caller from the request's tool names
/// (spec.md §4.5.1) and reused to de-shorten the response later.
pub fn chat_to_responses(chat: &Value, tool_map: &ToolNameMap) -> Value {
    let model_in = chat.get("model").and_then(Value::as_str).unwrap_or("gpt-5");
    let (model, effort) = resolve_model_and_effort(chat, model_in);

    let mut out = serde_json::Map::new();
    out.insert("model".into(), json!(model));
    out.insert(
        "reasoning".into(),
        json!({ "effort": effort, "summary": "auto" }),
    );
    out.insert("parallel_tool_calls".into(), json!(true));
    out.insert("include".into(), json!(["reasoning.encrypted_content"]));

    if let Some(stream) = chat.get("stream") {
        out.insert("stream".into(), stream.clone());
    }

    let response_format = chat.get("response_format");
    if let Some(format) = response_format.and_then(build_text_format) {
        let mut text = serde_json::Map::new();
        text.insert("format".into(), format);
        if let Some(verbosity) = chat
            .get("text")
            .and_then(|t| t.get("verbosity"))
            .cloned()
        {
            text.insert("verbosity".into(), verbosity);
        }
        out.insert("text".into(), Value::Object(text));
        out.insert("store".into(), json!(true));
    } else {
        out.insert("store".into(), json!(false));
    }

    let messages = chat
        .get("messages")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    if let Some(tools) = chat.get("tools").and_then(Value::as_array) {
        out.insert("tools".into(), json!(build_tools(tools, tool_map)));
    }

    out.insert(
        "instructions".into(),
        json!(find_instructions(&messages)),
    );
    out.insert("input".into(), json!(build_input(&messages, tool_map)));

    Value::Object(out)
}

fn resolve_model_and_effort(chat: &Value, model_in: &str) -> (String, String) {
    for (variant, effort) in GPT5_VARIANTS {
        if model_in == *variant {
            return ("gpt-5".to_string(), effort.to_string());
        }
    }
    let effort = chat
        .get("reasoning_effort")
        .and_then(Value::as_str)
        .unwrap_or("low")
        .to_string();
    (model_in.to_string(), effort)
}

fn build_text_format(response_format: &Value) -> Option<Value> {
    match response_format.get("type").and_then(Value::as_str)? {
        "text" => Some(json!({ "type": "text" })),
        "json_schema" => {
            let schema = response_format.get("json_schema")?;
            Some(json!({
                "type": "json_schema",
                "name": schema.get("name"),
                "strict": schema.get("strict"),
                "schema": schema.get("schema"),
            }))
        }
        _ => None,
    }
}

fn build_tools(tools: &[Value], tool_map: &ToolNameMap) -> Vec<Value> {
    tools
        .iter()
        .filter(|t| t.get("type").and_then(Value::as_str) == Some("function"))
        .filter_map(|t| {
            let func = t.get("function")?;
            let name = func.get("name").and_then(Value::as_str)?;
            let mut out = serde_json::Map::new();
            out.insert("type".into(), json!("function"));
            out.insert("name".into(), json!(tool_map.shorten(name)));
            if let Some(desc) = func.get("description") {
                out.insert("description".into(), desc.clone());
            }
            if let Some(params) = func.get("parameters") {
                out.insert("parameters".into(), params.clone());
            }
            if let Some(strict) = func.get("strict") {
                out.insert("strict".into(), strict.clone());
            }
            Some(Value::Object(out))
        })
        .collect()
}

fn find_instructions(messages: &[Value]) -> String {
    messages
        .iter()
        .find(|m| m.get("role").and_then(Value::as_str) == Some("system"))
        .and_then(|m| m.get("content"))
        .and_then(content_as_text)
        .unwrap_or_else(|| "You are a helpful assistant.".to_string())
}

fn content_as_text(content: &Value) -> Option<String> {
    match content {
        Value::String(s) => Some(s.clone()),
        Value::Array(parts) => {
            let text: String = parts
                .iter()
                .filter_map(|p| p.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("");
            (!text.is_empty()).then_some(text)
        }
        _ => None,
    }
}

fn build_input(messages: &[Value], tool_map: &ToolNameMap) -> Vec<Value> {
    let mut items = Vec::new();

    for message in messages {
        let role = message.get("role").and_then(Value::as_str).unwrap_or("user");

        if role == "tool" {
            let call_id = message
                .get("tool_call_id")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let output = message
                .get("content")
                .and_then(content_as_text)
                .unwrap_or_default();
            items.push(json!({
                "type": "function_call_output",
                "call_id": call_id,
                "output": output,
            }));
            continue;
        }

        if role == "system" {
            // Folded into `instructions`; not re-emitted as an input item.
            continue;
        }

        let out_role = if role == "system" { "user" } else { role };
        let is_assistant = out_role == "assistant";
        let parts = build_content_parts(message.get("content"), is_assistant);
        items.push(json!({
            "type": "message",
            "role": out_role,
            "content": parts,
        }));

        if is_assistant {
            if let Some(tool_calls) = message.get("tool_calls").and_then(Value::as_array) {
                for tc in tool_calls {
                    if tc.get("type").and_then(Value::as_str) != Some("function") {
                        continue;
                    }
                    let Some(func) = tc.get("function") else { continue };
                    let name = func.get("name").and_then(Value::as_str).unwrap_or_default();
                    let args = func.get("arguments").and_then(Value::as_str).unwrap_or_default();
                    items.push(json!({
                        "type": "function_call",
                        "call_id": tc.get("id"),
                        "name": tool_map.shorten(name),
                        "arguments": args,
                    }));
                }
            }
        }
    }

    items
}

fn build_content_parts(content: Option<&Value>, is_assistant: bool) -> Vec<Value> {
    let text_type = if is_assistant { "output_text" } else { "input_text" };
    match content {
        Some(Value::String(s)) => vec![json!({ "type": text_type, "text": s })],
        Some(Value::Array(parts)) => parts
            .iter()
            .filter_map(|part| {
                let part_type = part.get("type").and_then(Value::as_str)?;
                match part_type {
                    "text" => {
                        let text = part.get("text").and_then(Value::as_str)?;
                        Some(json!({ "type": text_type, "text": text }))
                    }
                    "image_url" if !is_assistant => {
                        let url = part.get("image_url").and_then(|u| u.get("url"))?;
                        Some(json!({ "type": "input_image", "image_url": url }))
                    }
                    _ => None,
                }
            })
            .collect(),
        _ => Vec::new(),
    }
}
