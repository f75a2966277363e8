//! Command extraction from step-execution responses.

const FENCE: &str = "```";
const OPENERS: [&str; 2] = ["```bash", "```shell"];

/// Return the body of the first ```` ```bash ```` / ```` ```shell ```` block.
///
/// Body lines are joined with `\n` verbatim, blank lines included. An
/// unterminated block runs to the end of the text. `None` means no such fence;
/// an empty block is still `Some("")`.
pub fn extract_command(text: &str) -> Option<String> {
    let mut lines = text.lines();
    lines.find(|line| is_opener(line))?;

    let body: Vec<&str> = lines.take_while(|line| !line.contains(FENCE)).collect();
    Some(body.join("\n"))
}

fn is_opener(line: &str) -> bool {
    let line = line.trim();
    OPENERS
        .iter()
        .any(|opener| line.eq_ignore_ascii_case(opener))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_bash_block() {
        let text = "I'll list the files.\n```bash\nls -la\n```\nDone.";
        assert_eq!(extract_command(text).as_deref(), Some("ls -la"));
    }

    #[test]
    fn keeps_internal_blank_lines_and_indentation() {
        let text = "```shell\ncd app\n\n  make build\n```";
        assert_eq!(
            extract_command(text).as_deref(),
            Some("cd app\n\n  make build")
        );
    }

    #[test]
    fn only_first_block_is_honored() {
        let text = "```bash\necho one\n```\n```bash\necho two\n```";
        assert_eq!(extract_command(text).as_deref(), Some("echo one"));
    }

    #[test]
    fn other_fences_are_ignored() {
        let text = "```python\nprint('x')\n```\n```\nplain\n```";
        assert_eq!(extract_command(text), None);
    }

    #[test]
    fn empty_block_is_present() {
        assert_eq!(extract_command("```bash\n```").as_deref(), Some(""));
    }

    #[test]
    fn unterminated_block_runs_to_end() {
        assert_eq!(
            extract_command("```bash\nmake\nmake test").as_deref(),
            Some("make\nmake test")
        );
    }

    #[test]
    fn no_fence_is_absent() {
        assert_eq!(extract_command("Nothing to run here."), None);
        assert_eq!(extract_command(""), None);
    }
}
