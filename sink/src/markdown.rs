const TELEGRAM_MAX_CHARS: usize = 4096;
const MARKDOWN_V2_SPECIAL: &[char] = &[
    '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!',
];

/// Escapes the characters MarkdownV2 treats as special, per Telegram's Bot
/// API formatting rules.
pub fn escape_markdown_v2(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if MARKDOWN_V2_SPECIAL.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Packs as many (already unescaped) `lines` as fit into a spoiler block
/// under `budget` bytes, escaping each line and dropping whatever doesn't
/// fit rather than truncating mid-line.
pub fn spoiler_block_with_budget(lines: &[String], budget: usize) -> String {
    let budget = budget.saturating_sub(4); // "**" + "||"
    let mut assembled = Vec::new();
    let mut used = 0usize;
    for line in lines {
        let escaped = format!("> {}", escape_markdown_v2(line));
        let increment = escaped.len() + if assembled.is_empty() { 0 } else { 1 };
        if used + increment > budget {
            break;
        }
        assembled.push(escaped);
        used += increment;
    }
    format!("**{}||", assembled.join("\n"))
}

pub fn max_chars() -> usize {
    TELEGRAM_MAX_CHARS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_all_reserved_characters() {
        let escaped = escape_markdown_v2("v1.2.0-beta (hotfix)!");
        assert_eq!(escaped, "v1\\.2\\.0\\-beta \\(hotfix\\)\\!");
    }

    #[test]
    fn drops_lines_that_would_overflow_budget() {
        let lines: Vec<String> = (0..200).map(|i| format!("mod-{i}(id{i}): {i}")).collect();
        let block = spoiler_block_with_budget(&lines, 200);
        assert!(block.len() <= 200);
        assert!(block.starts_with("**"));
        assert!(block.ends_with("||"));
    }
}
