// Owner REPL. Runs a snippet from a code block through the system shell and
// replies with whatever it printed. There is deliberately no sandbox here,
// which is exactly why the trusted check gates it.

use std::time::Duration;

use crate::discord::codeblocks;
use crate::discord::commands::moderation::trusted_check;
use crate::discord::commands::{Context, Error};

const EVAL_TIMEOUT: Duration = Duration::from_secs(30);
/// Leaves room for the code fences inside Discord's 2000-char limit.
const REPLY_LIMIT: usize = 1900;

/// Evaluates the given snippet and replies with its output.
#[poise::command(prefix_command, check = "trusted_check", aliases("sh", "exec", "run"))]
pub async fn eval(
    ctx: Context<'_>,
    #[description = "Snippet or fenced code block to run"]
    #[rest]
    code: String,
) -> Result<(), Error> {
    let snippet = codeblocks::first_block(&code)
        .map(|block| block.content)
        .unwrap_or(code);

    let _typing = ctx.defer_or_broadcast().await?;

    let reply = match run_snippet(&snippet, EVAL_TIMEOUT).await {
        Ok(output) => format!("```\n{}\n```", truncate(&output, REPLY_LIMIT)),
        Err(err) => format!("```\n{err}\n```"),
    };
    ctx.say(reply).await?;
    Ok(())
}

async fn run_snippet(snippet: &str, limit: Duration) -> Result<String, Error> {
    let run = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(snippet)
        .stdin(std::process::Stdio::null())
        .output();

    let output = tokio::time::timeout(limit, run)
        .await
        .map_err(|_| format!("snippet timed out after {}s", limit.as_secs()))??;

    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.trim().is_empty() {
        if !text.is_empty() {
            text.push('\n');
        }
        text.push_str("[stderr]\n");
        text.push_str(&stderr);
    }

    if text.trim().is_empty() {
        text = format!("(no output, {})", output.status);
    }
    Ok(text)
}

fn truncate(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.to_string();
    }
    let mut cut = limit;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", &text[..cut])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn snippet_output_is_captured() {
        let output = run_snippet("echo hello", EVAL_TIMEOUT).await.unwrap();
        assert_eq!(output.trim(), "hello");
    }

    #[tokio::test]
    async fn stderr_is_labelled() {
        let output = run_snippet("echo oops >&2", EVAL_TIMEOUT).await.unwrap();
        assert!(output.contains("[stderr]"));
        assert!(output.contains("oops"));
    }

    #[tokio::test]
    async fn silent_snippets_report_their_status() {
        let output = run_snippet("true", EVAL_TIMEOUT).await.unwrap();
        assert!(output.contains("no output"));
    }

    #[tokio::test]
    async fn runaway_snippets_time_out() {
        let result = run_snippet("sleep 5", Duration::from_millis(100)).await;
        assert!(result.is_err());
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");

        let long = "é".repeat(100);
        let cut = truncate(&long, 101);
        assert!(cut.ends_with("..."));
        assert!(cut.len() <= 104);
    }
}
