//! Segment reconstruction from model output.
//!
//! Accumulated completion text is repaired (code fences, whitespace runs,
//! unseparated brace/bracket seams) and decoded into an ordered list of
//! role-tagged segments. Decoding is all-or-nothing: a list that cannot be
//! decoded after repair fails the whole run, carrying the raw text for
//! diagnosis.

use std::path::Path;

use log::info;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::stream::{CancelToken, CompletionStream};
use super::Message;
use crate::config::LlmConfig;
use crate::error::{NovelVoiceError, Result};
use crate::progress::ProgressTracker;

/// Reserved role value for non-dialogue narration.
pub const NARRATOR_ROLE: &str = "旁白";

/// System prompt for interleaved narration + dialogue segmentation.
const NARRATION_PROMPT: &str = r#"你是一个专业的小说对话分割助手。请将输入的小说文本分割成对话和旁白片段。
要求：
1. 对话部分：
   - 只包含实际的对话内容（引号内的内容）
   - 去掉所有引号
   - 不包含说话前的动作描述
   - 不包含说话后的动作描述
   - 不包含省略号等非对话内容
2. 旁白部分：
   - 包含所有非对话内容
   - 每个动作描述或场景描写应该作为独立的旁白片段
   - 包括说话前的动作描述（如"张三突然开口问道"）
   - 包括说话后的动作描述（如"李四放下手中的书"）
   - 包括场景描写、心理描写等
3. 输出格式：JSON数组，每个元素包含：
   - role: 说话角色（对话部分）或"旁白"（非对话部分）
   - text: 具体内容"#;

/// System prompt for dialogue-only segmentation (narration omitted by the
/// model itself; the reconstructor never filters).
const DIALOGUE_ONLY_PROMPT: &str = r#"你是一个专业的小说对话分割助手。请将输入的小说文本分割成对话片段。
要求：
1. 只提取对话内容：
   - 只包含实际的对话内容（引号内的内容）
   - 去掉所有引号
   - 不包含说话前的动作描述
   - 不包含说话后的动作描述
   - 不包含省略号等非对话内容
   - 不包含任何旁白内容
2. 输出格式：JSON数组，每个元素包含：
   - role: 说话角色
   - text: 对话内容
3. 请确保JSON格式正确，不要将字段分割成多行。
4. 请保留所有对话内容，不要遗漏任何部分。
5. 直接输出JSON数组，不要添加任何Markdown标记。
6. 对话内容中的引号应该去掉，不要使用转义引号。
7. 请严格按照引号来区分对话，引号内的内容为对话。
8. 对话内容中不要包含任何引号，包括转义引号。"#;

/// One role-tagged utterance. Order within a segmentation result is
/// narration order and is preserved end to end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub role: String,
    pub text: String,
}

static FENCE_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"```json\s*").unwrap());
static FENCE_CLOSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*```").unwrap());
static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static BRACE_SEAM: Lazy<Regex> = Lazy::new(|| Regex::new(r"\}\s*\{").unwrap());
static BRACKET_SEAM: Lazy<Regex> = Lazy::new(|| Regex::new(r"\]\s*\[").unwrap());

/// Repair common structural defects in streamed model output.
///
/// Strips Markdown code fences, collapses whitespace runs and stitches a
/// separator between adjacent object/array boundaries that streaming left
/// concatenated. Best-effort: literal adjacent braces inside legitimate
/// content are indistinguishable from seams. Idempotent.
pub fn repair_model_output(raw: &str) -> String {
    let cleaned = raw.trim();
    let cleaned = FENCE_OPEN.replace_all(cleaned, "");
    let cleaned = FENCE_CLOSE.replace_all(&cleaned, "");
    let cleaned = WHITESPACE_RUN.replace_all(&cleaned, " ");
    let cleaned = BRACE_SEAM.replace_all(&cleaned, "},{");
    let cleaned = BRACKET_SEAM.replace_all(&cleaned, "],[");
    cleaned.trim().to_string()
}

/// Decode repaired model output into segments. All-or-nothing: on failure
/// the raw text travels with the error and no partial list is produced.
pub fn decode_segments(raw: &str) -> Result<Vec<Segment>> {
    let repaired = repair_model_output(raw);
    if repaired.is_empty() {
        return Err(NovelVoiceError::Segmentation {
            message: "model returned no content".to_string(),
            raw: raw.to_string(),
        });
    }
    serde_json::from_str::<Vec<Segment>>(&repaired).map_err(|e| NovelVoiceError::Segmentation {
        message: e.to_string(),
        raw: raw.to_string(),
    })
}

/// Segment a novel text through the configured LLM endpoint.
///
/// Streams the completion, forwarding each delta to the progress tracker,
/// then decodes the accumulated text. With `narration_enabled` the model is
/// instructed to interleave narrator and character segments covering the
/// whole input; without it, to emit dialogue only.
pub async fn split_dialogue(
    config: &LlmConfig,
    text: &str,
    narration_enabled: bool,
    cancel: CancelToken,
    tracker: Option<&ProgressTracker>,
) -> Result<Vec<Segment>> {
    let system_prompt = if narration_enabled {
        NARRATION_PROMPT
    } else {
        DIALOGUE_ONLY_PROMPT
    };
    let messages = vec![Message::system(system_prompt), Message::user(text)];

    let client = Client::new();
    let stream = CompletionStream::open(&client, config, &messages, cancel).await?;
    let content = stream
        .collect_with(|delta| {
            if let Some(t) = tracker {
                t.notify_progress(0.0, Some(delta.to_string()));
            }
        })
        .await?;

    let segments = decode_segments(&content)?;
    if segments.is_empty() {
        return Err(NovelVoiceError::Segmentation {
            message: "segmentation produced no segments".to_string(),
            raw: content,
        });
    }

    info!("Segmented input into {} segments", segments.len());
    Ok(segments)
}

/// Write the segmentation result to a pretty-printed JSON file for
/// operator review.
pub async fn write_review_file(segments: &[Segment], path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(segments)?;
    tokio::fs::write(path, json).await?;
    info!("Wrote segmentation review file to {}", path.display());
    Ok(())
}
