//! Reusable prompt templates served over MCP.

use super::protocol::{Content, GetPromptResult, Prompt, PromptArgument, PromptMessage};
use super::resources::resource_uri;
use crate::error::{AgentError, Result};
use crate::youtube::extract_video_id;
use serde_json::{Map, Value};

const MIN_COMPARED: usize = 2;
const MAX_COMPARED: usize = 5;

fn argument(name: &str, description: &str, required: bool) -> PromptArgument {
    PromptArgument {
        name: name.to_string(),
        description: description.to_string(),
        required,
    }
}

/// Prompts offered by `prompts/list`.
pub fn catalog() -> Vec<Prompt> {
    vec![
        Prompt {
            name: "summarize_video".to_string(),
            description: "Structured summary of a YouTube video".to_string(),
            arguments: vec![
                argument("video_url", "YouTube video URL", true),
                argument(
                    "style",
                    "One of general, technical, educational, business (default: general)",
                    false,
                ),
            ],
        },
        Prompt {
            name: "ask_about_video".to_string(),
            description: "Answer a question from a video's transcript".to_string(),
            arguments: vec![
                argument("video_url", "YouTube video URL", true),
                argument("question", "The question to answer", true),
            ],
        },
        Prompt {
            name: "compare_videos".to_string(),
            description: "Compare and contrast two to five YouTube videos".to_string(),
            arguments: vec![argument(
                "video_urls",
                "2-5 YouTube video URLs, as a JSON array or separated by commas or whitespace",
                true,
            )],
        },
    ]
}

/// Render the prompt `name` with its arguments.
///
/// Missing or malformed arguments and unknown prompt names are `InvalidInput`.
pub fn render(name: &str, arguments: &Map<String, Value>) -> Result<GetPromptResult> {
    let (description, text) = match name {
        "summarize_video" => {
            let (url, video_id) = video_argument(arguments, "video_url")?;
            let guide = style_guide(optional_str(arguments, "style").unwrap_or("general"));
            (
                "Structured summary of a YouTube video",
                format!(
                    "Please provide a comprehensive summary of this YouTube video: {url}\n\n\
                     Focus on: {guide}\n\n\
                     Structure your summary with:\n\
                     1. **Overview**: Brief description of the video's main topic\n\
                     2. **Key Points**: Main ideas discussed (bullet points)\n\
                     3. **Details**: Important specifics, examples, or data mentioned\n\
                     4. **Conclusion**: Final thoughts or recommendations from the video\n\n\
                     You can access the transcript using the resource: {uri}\n",
                    uri = resource_uri(&video_id)
                ),
            )
        }
        "ask_about_video" => {
            let (url, video_id) = video_argument(arguments, "video_url")?;
            let question = required_str(arguments, "question")?;
            (
                "Answer a question from a video's transcript",
                format!(
                    "Based on the transcript of this YouTube video: {url}\n\n\
                     Please answer this question: {question}\n\n\
                     Instructions:\n\
                     - Reference specific parts of the transcript when possible\n\
                     - If the video doesn't contain information to answer the question, say so\n\
                     - Be concise but thorough\n\n\
                     Access the transcript via: {uri}\n",
                    uri = resource_uri(&video_id)
                ),
            )
        }
        "compare_videos" => {
            let urls = url_list(arguments.get("video_urls"))?;
            let mut numbered = Vec::with_capacity(urls.len());
            let mut resources = Vec::with_capacity(urls.len());
            for (i, url) in urls.iter().enumerate() {
                let video_id = extract_video_id(url)
                    .ok_or_else(|| AgentError::InvalidInput(format!("Invalid YouTube URL: {}", url)))?;
                numbered.push(format!("{}. {}", i + 1, url));
                resources.push(format!("- {}", resource_uri(&video_id)));
            }
            (
                "Compare and contrast two to five YouTube videos",
                format!(
                    "Please compare and contrast these YouTube videos:\n\n{}\n\n\
                     Analyze:\n\
                     1. **Common Themes**: What topics/ideas appear in multiple videos?\n\
                     2. **Unique Perspectives**: What does each video contribute uniquely?\n\
                     3. **Contradictions**: Are there any conflicting viewpoints or information?\n\
                     4. **Quality**: Which video(s) provide the most comprehensive coverage?\n\
                     5. **Recommendation**: Which video would you recommend for someone new to this topic?\n\n\
                     Access transcripts via:\n{}\n",
                    numbered.join("\n"),
                    resources.join("\n")
                ),
            )
        }
        other => return Err(AgentError::InvalidInput(format!("Unknown prompt: {}", other))),
    };

    Ok(GetPromptResult {
        description: description.to_string(),
        messages: vec![PromptMessage {
            role: "user".to_string(),
            content: Content::Text { text },
        }],
    })
}

// Unknown styles fall back to the general guide
fn style_guide(style: &str) -> &'static str {
    match style.trim().to_lowercase().as_str() {
        "technical" => "technical concepts, code examples, implementation details, and best practices",
        "educational" => {
            "learning objectives, key concepts explained, teaching methods used, and main takeaways"
        }
        "business" => {
            "business insights, market trends, actionable recommendations, and strategic implications"
        }
        _ => "main topics discussed, key takeaways, and memorable quotes",
    }
}

fn optional_str<'a>(arguments: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    arguments
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn required_str<'a>(arguments: &'a Map<String, Value>, key: &str) -> Result<&'a str> {
    optional_str(arguments, key)
        .ok_or_else(|| AgentError::InvalidInput(format!("Missing '{}' argument", key)))
}

fn video_argument<'a>(arguments: &'a Map<String, Value>, key: &str) -> Result<(&'a str, String)> {
    let url = required_str(arguments, key)?;
    let video_id = extract_video_id(url)
        .ok_or_else(|| AgentError::InvalidInput(format!("Invalid YouTube URL: {}", url)))?;
    Ok((url, video_id))
}

fn url_list(value: Option<&Value>) -> Result<Vec<String>> {
    let urls: Vec<String> = match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(text)) => match serde_json::from_str::<Vec<String>>(text) {
            Ok(list) => list,
            Err(_) => text
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        },
        _ => return Err(AgentError::InvalidInput("Missing 'video_urls' argument".to_string())),
    };

    if urls.len() < MIN_COMPARED {
        return Err(AgentError::InvalidInput(format!(
            "Need at least {} videos to compare",
            MIN_COMPARED
        )));
    }
    if urls.len() > MAX_COMPARED {
        return Err(AgentError::InvalidInput(format!(
            "Can compare at most {} videos at once",
            MAX_COMPARED
        )));
    }
    Ok(urls)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn text(result: &GetPromptResult) -> &str {
        match &result.messages[0].content {
            Content::Text { text } => text.as_str(),
        }
    }

    #[test]
    fn test_catalog_names() {
        let names: Vec<String> = catalog().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["summarize_video", "ask_about_video", "compare_videos"]);
    }

    #[test]
    fn test_summarize_styles() {
        let technical = render(
            "summarize_video",
            &args(json!({"video_url": "https://youtu.be/dQw4w9WgXcQ", "style": "Technical"})),
        )
        .unwrap();
        assert_eq!(technical.messages[0].role, "user");
        assert!(text(&technical).contains("Focus on: technical concepts, code examples"));
        assert!(text(&technical).contains("transcript://dQw4w9WgXcQ"));

        let fallback = render(
            "summarize_video",
            &args(json!({"video_url": "dQw4w9WgXcQ", "style": "poetic"})),
        )
        .unwrap();
        assert!(text(&fallback).contains("Focus on: main topics discussed"));
    }

    #[test]
    fn test_ask_requires_question() {
        let err = render("ask_about_video", &args(json!({"video_url": "dQw4w9WgXcQ"}))).unwrap_err();
        assert!(matches!(err, AgentError::InvalidInput(msg) if msg.contains("question")));

        let ok = render(
            "ask_about_video",
            &args(json!({"video_url": "dQw4w9WgXcQ", "question": "Who sings?"})),
        )
        .unwrap();
        assert!(text(&ok).contains("Please answer this question: Who sings?"));
    }

    #[test]
    fn test_compare_bounds_and_formats() {
        let one = render("compare_videos", &args(json!({"video_urls": ["dQw4w9WgXcQ"]})));
        assert!(matches!(one, Err(AgentError::InvalidInput(msg)) if msg.contains("at least 2")));

        let six: Vec<String> = (0..6).map(|i| format!("abcdefghij{}", i)).collect();
        let too_many = render("compare_videos", &args(json!({"video_urls": six})));
        assert!(matches!(too_many, Err(AgentError::InvalidInput(msg)) if msg.contains("at most 5")));

        let from_text = render(
            "compare_videos",
            &args(json!({"video_urls": "https://youtu.be/dQw4w9WgXcQ, https://youtu.be/abcdefghij0"})),
        )
        .unwrap();
        assert!(text(&from_text).contains("1. https://youtu.be/dQw4w9WgXcQ\n2. https://youtu.be/abcdefghij0"));
        assert!(text(&from_text).contains("- transcript://dQw4w9WgXcQ\n- transcript://abcdefghij0"));

        let from_json = render(
            "compare_videos",
            &args(json!({"video_urls": "[\"dQw4w9WgXcQ\", \"abcdefghij0\"]"})),
        )
        .unwrap();
        assert!(text(&from_json).contains("2. abcdefghij0"));

        let bad = render("compare_videos", &args(json!({"video_urls": ["dQw4w9WgXcQ", "nope"]})));
        assert!(matches!(bad, Err(AgentError::InvalidInput(msg)) if msg.contains("nope")));
    }

    #[test]
    fn test_unknown_prompt() {
        assert!(matches!(render("write_poem", &Map::new()), Err(AgentError::InvalidInput(_))));
    }
}
