// Fenced-codeblock helpers shared by the eval command and the paste mover.

use regex::Regex;
use std::sync::OnceLock;

use crate::infra::paste::PasteFile;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    pub language: Option<String>,
    pub content: String,
}

fn fence_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?s)```(?P<lang>\w+)?\n?(?P<code>.+?)```").unwrap())
}

/// All fenced blocks in a message, in order.
pub fn blocks(content: &str) -> Vec<CodeBlock> {
    fence_pattern()
        .captures_iter(content)
        .map(|caps| CodeBlock {
            language: caps.name("lang").map(|m| m.as_str().to_string()),
            content: caps.name("code").map_or(String::new(), |m| {
                m.as_str().trim_matches('\n').to_string()
            }),
        })
        .collect()
}

pub fn first_block(content: &str) -> Option<CodeBlock> {
    blocks(content).into_iter().next()
}

/// Replace every fenced block with a `[File-N.ext]` marker and return the
/// rewritten message plus the files to upload.
pub fn extract_paste_files(content: &str) -> (String, Vec<PasteFile>) {
    let mut rewritten = content.to_string();
    let mut files = Vec::new();

    for (idx, caps) in fence_pattern().captures_iter(content).enumerate() {
        let language = caps
            .name("lang")
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| "txt".to_string());
        let filename = format!("File-{}.{}", idx + 1, language);
        let code = caps.name("code").map_or("", |m| m.as_str());

        rewritten = rewritten.replace(&caps[0], &format!("`[{filename}]`"));
        files.push(PasteFile {
            filename,
            content: code.trim_matches('\n').to_string(),
        });
    }

    (rewritten, files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_with_language_tag() {
        let block = first_block("before ```rs\nlet x = 1;\n``` after").unwrap();
        assert_eq!(block.language.as_deref(), Some("rs"));
        assert_eq!(block.content, "let x = 1;");
    }

    #[test]
    fn block_without_language_tag() {
        let block = first_block("```\necho hello\n```").unwrap();
        assert_eq!(block.content, "echo hello");
    }

    #[test]
    fn multiple_blocks_in_order() {
        let found = blocks("```rs\nfirst\n``` text ```py\nsecond\n```");
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].content, "first");
        assert_eq!(found[1].language.as_deref(), Some("py"));
    }

    #[test]
    fn plain_text_has_no_blocks() {
        assert!(blocks("no fences here").is_empty());
        assert!(first_block("`inline code` only").is_none());
    }

    #[test]
    fn paste_extraction_rewrites_markers() {
        let (rewritten, files) =
            extract_paste_files("look at this ```rs\nfn main() {}\n``` neat");

        assert_eq!(rewritten, "look at this `[File-1.rs]` neat");
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].filename, "File-1.rs");
        assert_eq!(files[0].content, "fn main() {}");
    }

    #[test]
    fn paste_extraction_defaults_to_txt() {
        let (_, files) = extract_paste_files("```\nplain\n```");
        assert_eq!(files[0].filename, "File-1.txt");
    }
}
