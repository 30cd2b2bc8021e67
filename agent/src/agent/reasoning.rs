//! Reasoning-model output cleanup
//!
//! Reasoning models (qwen3, deepseek-r1, ...) wrap their chain of thought in
//! `<think>...</think>`. Nothing inside those blocks is part of the answer, so
//! it must never reach the history or any reply parser.

use std::sync::LazyLock;

use regex::Regex;

// An unterminated block (reply cut off mid-thought) runs to the end
static THINK_TAG_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<think>.*?(?:</think>|\z)").expect("Invalid think tag regex")
});

/// Strip `<think>...</think>` blocks from a model reply
pub fn strip_think_tags(content: &str) -> String {
    if !content.contains("<think>") {
        return content.trim().to_string();
    }
    THINK_TAG_REGEX.replace_all(content, "").trim().to_string()
}
