//! Parsing `<think>` / `<execute>` sections out of a model reply.

use std::sync::LazyLock;

use regex::Regex;

static THINK: LazyLock<Regex> = LazyLock::new(|| section_pattern("think"));
static EXECUTE: LazyLock<Regex> = LazyLock::new(|| section_pattern("execute"));

fn section_pattern(tag: &str) -> Regex {
    // Tag names are fixed literals, so the pattern always compiles.
    match Regex::new(&format!(r"(?s)<{tag}>(.*?)</{tag}>")) {
        Ok(re) => re,
        Err(err) => unreachable!("section pattern for <{tag}>: {err}"),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reply {
    pub thought: String,
    pub code: String,
}

/// First `<think>` and first `<execute>` section, trimmed. Missing sections are empty.
pub fn parse_reply(text: &str) -> Reply {
    Reply {
        thought: first_section(&THINK, text),
        code: first_section(&EXECUTE, text),
    }
}

fn first_section(pattern: &Regex, text: &str) -> String {
    pattern
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_both_sections() {
        let reply = parse_reply(
            "<think>\n find the apple first \n</think>\nsome chatter\n<execute>\nobj = 'apple'\nfind(obj)\n</execute>",
        );
        assert_eq!(reply.thought, "find the apple first");
        assert_eq!(reply.code, "obj = 'apple'\nfind(obj)");
    }

    #[test]
    fn missing_execute_is_empty() {
        let reply = parse_reply("<think>nothing to do</think>");
        assert_eq!(reply.thought, "nothing to do");
        assert_eq!(reply.code, "");
    }

    #[test]
    fn first_section_wins_and_tags_are_case_sensitive() {
        let reply = parse_reply("<EXECUTE>a()</EXECUTE><execute>b()</execute><execute>c()</execute>");
        assert_eq!(reply.code, "b()");
        assert_eq!(reply.thought, "");
    }
}
