//! Textual tool-call protocol shown to the model.

use super::ToolSpec;
use crate::config::Prompts;
use serde_json::Value;

pub const TOOL_CALL_OPEN: &str = "<tool_call>";
pub const TOOL_CALL_CLOSE: &str = "</tool_call>";
const TOOL_RESPONSE_OPEN: &str = "<tool_response>";
const TOOL_RESPONSE_CLOSE: &str = "</tool_response>";

const TOOLS_BLOCK: &str = "# Tools

You may call one or more functions to assist with the user query.

You are provided with function signatures within <tools></tools> XML tags:
<tools>
{tool_text}
</tools>";

const FORMAT_BLOCK: &str = r#"For each function call, return a json object with function name and arguments within <tool_call></tool_call> XML tags:
<tool_call>
{"name": <function-name>, "arguments": <args-json-object>}
</tool_call>

IMPORTANT: After tools execute and return results, you will receive those results in <tool_response> tags.
You MUST use these tool results to answer the user's question. Do NOT ignore tool results.
Do NOT say you cannot access the content when you have just received it via tools."#;

/// Build the system instruction block for the given tools.
///
/// With no tools the protocol blocks are left out and the model is told to answer directly.
pub fn format_for_prompt(tools: &[ToolSpec], prompts: &Prompts) -> String {
    if tools.is_empty() {
        return Prompts::render(&prompts.agent.no_tools, &prompts.variables);
    }

    let tool_text = tools
        .iter()
        .map(|t| t.to_function_json().to_string())
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "{}\n\n{}\n\n{}\n",
        prompts.task_prompt(),
        TOOLS_BLOCK.replace("{tool_text}", &tool_text),
        FORMAT_BLOCK
    )
}

/// Build the consolidated tool-result message content.
pub fn format_tool_results(header: &str, responses: &[Value]) -> String {
    let body = responses
        .iter()
        .map(|r| format!("{}\n{}\n{}", TOOL_RESPONSE_OPEN, r, TOOL_RESPONSE_CLOSE))
        .collect::<Vec<_>>()
        .join("\n");

    format!("{}\n\n{}", header, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::youtube_tool_specs;
    use serde_json::json;

    #[test]
    fn test_prompt_lists_each_tool_on_own_line() {
        let prompts = Prompts::default();
        let specs = youtube_tool_specs();
        let prompt = format_for_prompt(&specs, &prompts);

        assert!(prompt.starts_with(&prompts.agent.task));
        let start = prompt.find("<tools>\n").unwrap() + "<tools>\n".len();
        let end = prompt.find("\n</tools>").unwrap();
        let lines: Vec<&str> = prompt[start..end].lines().collect();
        assert_eq!(lines.len(), specs.len());

        let first: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["function"]["name"], "get_video_transcript");
        assert!(prompt.contains(r#"{"name": <function-name>, "arguments": <args-json-object>}"#));
    }

    #[test]
    fn test_prompt_without_tools() {
        let prompts = Prompts::default();
        let prompt = format_for_prompt(&[], &prompts);
        assert_eq!(prompt, prompts.agent.no_tools);
        assert!(!prompt.contains("<tools>"));
    }

    #[test]
    fn test_tool_results_layout() {
        let text = format_tool_results(
            "HEADER:",
            &[json!({"name": "a", "results": 1}), json!({"name": "b", "results": "x"})],
        );
        assert_eq!(
            text,
            "HEADER:\n\n<tool_response>\n{\"name\":\"a\",\"results\":1}\n</tool_response>\n\
             <tool_response>\n{\"name\":\"b\",\"results\":\"x\"}\n</tool_response>"
        );
    }
}
