//! Chat ⇄ Completions adapter (spec.md §4.5.5, §6 `/v1/completions`).
//!
//! The Completions dialect has no native upstream equivalent: a Completions
//! request is wrapped into a single-message Chat request before being
//! routed through the ordinary Chat→Responses path, and the Chat response
//! is rewrapped back into a Completions response on the way out.

use serde_json::{Value, json};

/// Wrap a Completions request's `prompt` into a one-message Chat request.
pub fn completions_to_chat(completions: &Value) -> Value {
    let prompt = completions.get("prompt").cloned().unwrap_or(Value::String(String::new()));
    let mut out = serde_json::Map::new();
    if let Some(model) = completions.get("model") {
        out.insert("model".into(), model.clone());
    }
    if let Some(stream) = completions.get("stream") {
        out.insert("stream".into(), stream.clone());
    }
    out.insert(
        "messages".into(),
        json!([{ "role": "user", "content": prompt }]),
    );
    Value::Object(out)
}

/// Non-streaming: rewrap a `chat.completion` object into a
/// `text_completion` object.
pub fn chat_to_completions(chat: &Value) -> Value {
    let choice = &chat["choices"][0];
    let text = choice["message"]["content"].clone();
    let finish_reason = choice.get("finish_reason").cloned().unwrap_or(Value::Null);

    json!({
        "id": chat.get("id"),
        "object": "text_completion",
        "created": chat.get("created"),
        "model": chat.get("model"),
        "choices": [{
            "index": 0,
            "text": text,
            "finish_reason": finish_reason,
            "logprobs": Value::Null,
        }],
        "usage": chat.get("usage"),
    })
}

/// Streaming: rewrap one `chat.completion.chunk` into a `text_completion`
/// chunk, mapping `delta.content` through to `text`.
pub fn chat_chunk_to_completions_chunk(chunk: &Value) -> Value {
    let choice = &chunk["choices"][0];
    let text = choice["delta"].get("content").cloned().unwrap_or(Value::Null);
    let finish_reason = choice.get("finish_reason").cloned().unwrap_or(Value::Null);

    json!({
        "id": chunk.get("id"),
        "object": "text_completion",
        "created": chunk.get("created"),
        "model": chunk.get("model"),
        "choices": [{
            "index": 0,
            "text": text,
            "finish_reason": finish_reason,
            "logprobs": Value::Null,
        }],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_prompt_into_single_user_message() {
        let completions = json!({ "model": "gpt-5", "prompt": "hello", "stream": false });
        let chat = completions_to_chat(&completions);
        assert_eq!(chat["model"], "gpt-5");
        assert_eq!(chat["messages"][0]["role"], "user");
        assert_eq!(chat["messages"][0]["content"], "hello");
    }

    #[test]
    fn rewraps_chat_completion_into_text_completion() {
        let chat = json!({
            "id": "chatcmpl-1",
            "created": 10,
            "model": "gpt-5",
            "choices": [{ "message": { "content": "the answer" }, "finish_reason": "stop" }],
            "usage": { "total_tokens": 5 },
        });
        let completions = chat_to_completions(&chat);
        assert_eq!(completions["object"], "text_completion");
        assert_eq!(completions["choices"][0]["text"], "the answer");
        assert_eq!(completions["choices"][0]["finish_reason"], "stop");
    }

    #[test]
    fn rewraps_chat_chunk_into_completions_chunk() {
        let chunk = json!({
            "id": "chatcmpl-1",
            "choices": [{ "delta": { "content": "partial" }, "finish_reason": Value::Null }],
        });
        let completions_chunk = chat_chunk_to_completions_chunk(&chunk);
        assert_eq!(completions_chunk["choices"][0]["text"], "partial");
    }
}
