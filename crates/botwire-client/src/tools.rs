// SPDX-FileCopyrightText: 2026 Botwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tool-call aggregation and execution.
//!
//! During the first query round a bot streams tool-call deltas inside
//! `json` events (`choices[0].delta.tool_calls`, OpenAI shape). Deltas
//! sharing an `index` are concatenated in arrival order; the aggregated
//! calls are dispatched to local executables and the stringified results
//! feed the second round.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use botwire_core::case::camel_to_snake;
use botwire_core::types::{
    FunctionCallDefinition, PartialResponse, ToolCallDefinition, ToolResultDefinition,
};
use futures::stream::BoxStream;
use serde_json::{Map, Value};

/// One item produced by a tool executable: either live status text
/// forwarded upstream, or the terminal result value.
#[derive(Debug, Clone)]
pub enum ToolOutput {
    Status(PartialResponse),
    Done(Value),
}

/// A locally runnable tool. The stream it returns may yield any number of
/// [`ToolOutput::Status`] items before its terminal [`ToolOutput::Done`].
pub trait ToolExecutable: Send + Sync {
    /// The executable's name; matched against `function.name` of incoming
    /// tool calls after camelCase-to-snake_case normalization.
    fn name(&self) -> &str;

    fn call(&self, arguments: Value) -> BoxStream<'static, ToolOutput>;
}

/// Accumulates tool-call deltas keyed by their stable `index`.
///
/// The map is ordered, so draining it yields calls sorted by ascending
/// index regardless of arrival order. Shape mismatches are skipped, never
/// raised: the payload is bot-controlled JSON.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    calls: BTreeMap<u64, ToolCallBuilder>,
}

#[derive(Debug, Default)]
struct ToolCallBuilder {
    id: String,
    tool_type: String,
    name: String,
    arguments: String,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one `json` event payload. Payloads without
    /// `choices[0].delta.tool_calls` are ignored.
    pub fn feed(&mut self, data: &Map<String, Value>) {
        let Some(deltas) = data
            .get("choices")
            .and_then(|choices| choices.get(0))
            .and_then(|choice| choice.get("delta"))
            .and_then(|delta| delta.get("tool_calls"))
            .and_then(Value::as_array)
        else {
            return;
        };

        for delta in deltas {
            let Some(index) = delta.get("index").and_then(Value::as_u64) else {
                continue;
            };
            let call = self.calls.entry(index).or_default();

            if let Some(id) = delta.get("id").and_then(Value::as_str) {
                if !id.is_empty() {
                    call.id = id.to_string();
                }
            }
            if let Some(tool_type) = delta.get("type").and_then(Value::as_str) {
                call.tool_type = tool_type.to_string();
            }
            if let Some(function) = delta.get("function") {
                if let Some(name) = function.get("name").and_then(Value::as_str) {
                    call.name = name.to_string();
                }
                if let Some(arguments) = function.get("arguments").and_then(Value::as_str) {
                    call.arguments.push_str(arguments);
                }
            }
        }
    }

    /// Drains the accumulator into calls ordered by ascending index.
    pub fn finish(self) -> Vec<ToolCallDefinition> {
        self.calls
            .into_values()
            .map(|call| ToolCallDefinition {
                id: call.id,
                tool_type: if call.tool_type.is_empty() {
                    "function".to_string()
                } else {
                    call.tool_type
                },
                function: FunctionCallDefinition {
                    name: call.name,
                    arguments: call.arguments,
                },
            })
            .collect()
    }
}

/// Builds the lookup table from executables, keyed by the snake_case form
/// of each executable's name.
pub(crate) fn executable_map(
    executables: &[Arc<dyn ToolExecutable>],
) -> HashMap<String, Arc<dyn ToolExecutable>> {
    executables
        .iter()
        .map(|executable| (camel_to_snake(executable.name()), Arc::clone(executable)))
        .collect()
}

/// Wraps a terminal tool result for the second query round. The result
/// value is JSON-stringified into `content`.
pub(crate) fn tool_result(
    call: &ToolCallDefinition,
    result: &Value,
) -> Result<ToolResultDefinition, serde_json::Error> {
    Ok(ToolResultDefinition {
        role: "tool".to_string(),
        name: call.function.name.clone(),
        tool_call_id: call.id.clone(),
        content: serde_json::to_string(result)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn delta_payload(deltas: Value) -> Map<String, Value> {
        let value = json!({
            "choices": [{"delta": {"tool_calls": deltas}}]
        });
        value.as_object().unwrap().clone()
    }

    #[test]
    fn deltas_concatenate_in_arrival_order_and_sort_by_index() {
        let mut acc = ToolCallAccumulator::new();
        acc.feed(&delta_payload(json!([
            {"index": 1, "id": "call_b", "type": "function",
             "function": {"name": "mul", "arguments": "b"}}
        ])));
        acc.feed(&delta_payload(json!([
            {"index": 0, "id": "call_a", "type": "function",
             "function": {"name": "add", "arguments": "a"}}
        ])));
        acc.feed(&delta_payload(json!([
            {"index": 1, "function": {"arguments": "c"}}
        ])));

        let calls = acc.finish();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].function.name, "add");
        assert_eq!(calls[0].function.arguments, "a");
        assert_eq!(calls[1].function.name, "mul");
        assert_eq!(calls[1].function.arguments, "bc");
    }

    #[test]
    fn malformed_payloads_are_skipped() {
        let mut acc = ToolCallAccumulator::new();

        // No choices at all.
        acc.feed(json!({"object": "chat.completion.chunk"}).as_object().unwrap());
        // Delta without an index.
        acc.feed(&delta_payload(json!([
            {"function": {"name": "orphan", "arguments": "x"}}
        ])));
        // tool_calls is not an array.
        acc.feed(
            json!({"choices": [{"delta": {"tool_calls": "nope"}}]})
                .as_object()
                .unwrap(),
        );

        assert!(acc.finish().is_empty());
    }

    #[test]
    fn missing_type_defaults_to_function() {
        let mut acc = ToolCallAccumulator::new();
        acc.feed(&delta_payload(json!([
            {"index": 0, "id": "call_a", "function": {"name": "f", "arguments": "{}"}}
        ])));
        let calls = acc.finish();
        assert_eq!(calls[0].tool_type, "function");
    }

    #[test]
    fn executable_names_are_snake_cased_for_lookup() {
        struct Named(&'static str);
        impl ToolExecutable for Named {
            fn name(&self) -> &str {
                self.0
            }
            fn call(&self, _arguments: Value) -> BoxStream<'static, ToolOutput> {
                Box::pin(futures::stream::empty())
            }
        }

        let executables: Vec<Arc<dyn ToolExecutable>> =
            vec![Arc::new(Named("getWeather")), Arc::new(Named("add"))];
        let map = executable_map(&executables);
        assert!(map.contains_key("get_weather"));
        assert!(map.contains_key("add"));
    }

    #[test]
    fn tool_result_stringifies_value() {
        let call = ToolCallDefinition {
            id: "call_1".into(),
            tool_type: "function".into(),
            function: FunctionCallDefinition {
                name: "add".into(),
                arguments: r#"{"a":1,"b":2}"#.into(),
            },
        };
        let result = tool_result(&call, &json!(3)).unwrap();
        assert_eq!(result.role, "tool");
        assert_eq!(result.name, "add");
        assert_eq!(result.tool_call_id, "call_1");
        assert_eq!(result.content, "3");
    }
}
