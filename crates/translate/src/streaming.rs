//! Responses → Chat, streaming (spec.md §4.5.4, §9).
//!
//! One [`StreamState`] per in-flight stream: a small record {fnIdx, model,
//! stream id, created_at} initialized lazily off the first event that
//! carries it, never promoted to shared state (spec.md §9).

use serde_json::{Value, json};

use crate::tool_names::ToolNameMap;

#[derive(Debug, Default)]
pub struct StreamState {
    fn_idx: Option<i64>,
    id: Option<String>,
    model: Option<String>,
    created: Option<i64>,
}

impl StreamState {
    pub fn new() -> Self {
        Self::default()
    }

    fn remember_metadata(&mut self, response: &Value) {
        if self.id.is_none() {
            self.id = response.get("id").and_then(Value::as_str).map(String::from);
        }
        if self.model.is_none() {
            self.model = response.get("model").and_then(Value::as_str).map(String::from);
        }
        if self.created.is_none() {
            self.created = response.get("created_at").and_then(Value::as_i64);
        }
    }

    fn chunk(&self, delta: Value) -> Value {
        json!({
            "id": self.id,
            "object": "chat.completion.chunk",
            "created": self.created,
            "model": self.model,
            "choices": [{
                "index": 0,
                "delta": delta,
                "finish_reason": Value::Null,
            }],
        })
    }

    /// Translate one upstream Responses SSE event into zero-or-one
    /// downstream Chat SSE events.
    pub fn translate_event(&mut self, event: &Value, tool_map: &ToolNameMap) -> Option<Value> {
        match event.get("type").and_then(Value::as_str)? {
            "response.reasoning_summary_text.delta" => {
                let delta = event.get("delta").cloned().unwrap_or(Value::Null);
                Some(self.chunk(json!({ "reasoning_content": delta })))
            }
            "response.reasoning_summary_text.done" => {
                Some(self.chunk(json!({ "reasoning_content": "\n\n" })))
            }
            "response.output_text.delta" => {
                let delta = event.get("delta").cloned().unwrap_or(Value::Null);
                Some(self.chunk(json!({ "content": delta })))
            }
            "response.output_item.done" => {
                let item = event.get("item")?;
                if item.get("type").and_then(Value::as_str) != Some("function_call") {
                    return None;
                }
                let next_idx = self.fn_idx.unwrap_or(-1) + 1;
                self.fn_idx = Some(next_idx);
                let name = item.get("name").and_then(Value::as_str).unwrap_or_default();
                Some(self.chunk(json!({
                    "tool_calls": [{
                        "index": next_idx,
                        "id": item.get("call_id"),
                        "type": "function",
                        "function": {
                            "name": tool_map.lengthen(name),
                            "arguments": item.get("arguments"),
                        },
                    }],
                })))
            }
            "response.completed" => {
                if let Some(response) = event.get("response") {
                    self.remember_metadata(response);
                }
                let finish_reason = if self.fn_idx.is_some() { "tool_calls" } else { "stop" };
                Some(json!({
                    "id": self.id,
                    "object": "chat.completion.chunk",
                    "created": self.created,
                    "model": self.model,
                    "choices": [{
                        "index": 0,
                        "delta": {},
                        "finish_reason": finish_reason,
                        "native_finish_reason": finish_reason,
                    }],
                }))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_text_delta_maps_to_content_delta() {
        let mut state = StreamState::new();
        let map = ToolNameMap::default();
        let event = json!({ "type": "response.output_text.delta", "delta": "hi" });
        let chunk = state.translate_event(&event, &map).unwrap();
        assert_eq!(chunk["choices"][0]["delta"]["content"], "hi");
    }

    #[test]
    fn reasoning_done_emits_double_newline() {
        let mut state = StreamState::new();
        let map = ToolNameMap::default();
        let event = json!({ "type": "response.reasoning_summary_text.done" });
        let chunk = state.translate_event(&event, &map).unwrap();
        assert_eq!(chunk["choices"][0]["delta"]["reasoning_content"], "\n\n");
    }

    #[test]
    fn function_call_output_item_increments_index_and_deshortens() {
        let map = ToolNameMap::build(["my_very_long_tool_name_exceeding_the_sixty_four_character_cap_xx"]);
        let shortened = map.shorten("my_very_long_tool_name_exceeding_the_sixty_four_character_cap_xx");
        let mut state = StreamState::new();
        let event = json!({
            "type": "response.output_item.done",
            "item": { "type": "function_call", "call_id": "call_1", "name": shortened, "arguments": "{}" },
        });
        let chunk = state.translate_event(&event, &map).unwrap();
        assert_eq!(chunk["choices"][0]["delta"]["tool_calls"][0]["index"], 0);
        assert_eq!(
            chunk["choices"][0]["delta"]["tool_calls"][0]["function"]["name"],
            "my_very_long_tool_name_exceeding_the_sixty_four_character_cap_xx"
        );
    }

    #[test]
    fn non_function_call_output_item_done_is_ignored() {
        let mut state = StreamState::new();
        let map = ToolNameMap::default();
        let event = json!({ "type": "response.output_item.done", "item": { "type": "message" } });
        assert!(state.translate_event(&event, &map).is_none());
    }

    #[test]
    fn completed_without_tool_calls_finishes_as_stop() {
        let mut state = StreamState::new();
        let map = ToolNameMap::default();
        let event = json!({ "type": "response.completed", "response": { "id": "r1", "model": "gpt-5", "created_at": 10 } });
        let chunk = state.translate_event(&event, &map).unwrap();
        assert_eq!(chunk["choices"][0]["finish_reason"], "stop");
        assert_eq!(chunk["id"], "r1");
    }

    #[test]
    fn completed_after_tool_call_finishes_as_tool_calls() {
        let mut state = StreamState::new();
        let map = ToolNameMap::default();
        let item_event = json!({
            "type": "response.output_item.done",
            "item": { "type": "function_call", "call_id": "c", "name": "f", "arguments": "{}" },
        });
        state.translate_event(&item_event, &map);
        let completed = json!({ "type": "response.completed", "response": {} });
        let chunk = state.translate_event(&completed, &map).unwrap();
        assert_eq!(chunk["choices"][0]["finish_reason"], "tool_calls");
    }

    #[test]
    fn unrelated_event_type_produces_no_output() {
        let mut state = StreamState::new();
        let map = ToolNameMap::default();
        let event = json!({ "type": "response.in_progress" });
        assert!(state.translate_event(&event, &map).is_none());
    }
}
