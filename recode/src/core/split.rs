//! Splitting model-generated code into independent top-level blocks.

use thiserror::Error;

use crate::fragment::{ParseError, contains_definition, parse_program};

/// A block that cannot become a child fragment.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SplitError {
    #[error("block {index} is not valid code: {message}")]
    Invalid { index: usize, message: String },
    #[error("block {index} is an incomplete statement: {message}")]
    Incomplete { index: usize, message: String },
    #[error("function definitions (def, async def, lambda) are not allowed in expanded code")]
    Disallowed,
}

/// Broad class of a split failure; each one gets its own corrective hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Violation {
    Syntax,
    Disallowed,
}

impl SplitError {
    pub fn category(&self) -> Violation {
        match self {
            SplitError::Invalid { .. } | SplitError::Incomplete { .. } => Violation::Syntax,
            SplitError::Disallowed => Violation::Disallowed,
        }
    }
}

/// Split `source` into top-level statements, in order.
///
/// Source that parses as a whole is cut along statement line ranges (statements
/// sharing a line stay together). Otherwise lines are accumulated until the
/// buffer parses; unparseable lines become blocks of their own so `validate`
/// can reject them.
pub fn split(source: &str) -> Result<Vec<String>, SplitError> {
    if source.trim().is_empty() {
        return Ok(Vec::new());
    }
    match parse_program(source) {
        Ok(program) => {
            if contains_definition(&program) {
                return Err(SplitError::Disallowed);
            }
            let lines: Vec<&str> = source.lines().collect();
            let mut ranges: Vec<(usize, usize)> = Vec::new();
            for stmt in &program {
                match ranges.last_mut() {
                    Some((_, end)) if stmt.line <= *end => *end = (*end).max(stmt.end_line),
                    _ => ranges.push((stmt.line, stmt.end_line)),
                }
            }
            Ok(ranges
                .into_iter()
                .map(|(start, end)| {
                    let end = end.min(lines.len());
                    lines[start.saturating_sub(1)..end].join("\n")
                })
                .collect())
        }
        Err(_) => Ok(split_incremental(source)),
    }
}

fn compiles(lines: &[&str]) -> Result<(), ParseError> {
    parse_program(&lines.join("\n")).map(|_| ())
}

/// Whether the next meaningful line belongs to the statement just parsed.
fn continues(rest: &[&str]) -> bool {
    let Some(next) = rest.iter().find(|line| !line.trim().is_empty()) else {
        return false;
    };
    if next.starts_with([' ', '\t']) {
        return true;
    }
    ["elif", "else", "except", "finally"].iter().any(|kw| {
        next.strip_prefix(kw)
            .is_some_and(|tail| !tail.starts_with(|c: char| c.is_alphanumeric() || c == '_'))
    })
}

fn split_incremental(source: &str) -> Vec<String> {
    let lines: Vec<&str> = source.lines().collect();
    let mut blocks = Vec::new();
    let mut buf: Vec<&str> = Vec::new();

    for (i, &line) in lines.iter().enumerate() {
        if buf.is_empty() && line.trim().is_empty() {
            continue;
        }
        buf.push(line);
        match compiles(&buf) {
            Ok(()) => {
                if !continues(&lines[i + 1..]) {
                    blocks.push(buf.join("\n"));
                    buf.clear();
                }
            }
            Err(err) if err.is_incomplete() => {}
            Err(_) => {
                let previous = &buf[..buf.len() - 1];
                if !previous.is_empty() && compiles(previous).is_ok() {
                    blocks.push(previous.join("\n"));
                    buf = vec![line];
                    match compiles(&buf) {
                        Err(err) if !err.is_incomplete() => {
                            blocks.push(line.to_string());
                            buf.clear();
                        }
                        _ => {}
                    }
                } else if let Some(last) = buf.pop() {
                    blocks.push(last.to_string());
                }
            }
        }
    }
    if !buf.is_empty() {
        blocks.push(buf.join("\n"));
    }
    blocks
}

/// Reject blocks that do not parse on their own, or that define functions.
pub fn validate(blocks: &[String]) -> Result<(), SplitError> {
    for (index, block) in blocks.iter().enumerate() {
        let program = parse_program(block).map_err(|err| {
            if err.is_incomplete() {
                SplitError::Incomplete {
                    index,
                    message: err.to_string(),
                }
            } else {
                SplitError::Invalid {
                    index,
                    message: err.to_string(),
                }
            }
        })?;
        if contains_definition(&program) {
            return Err(SplitError::Disallowed);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_source_splits_to_nothing() {
        assert_eq!(split("  \n\n").expect("split"), Vec::<String>::new());
    }

    #[test]
    fn splits_simple_statements() {
        let source = "obj = \"apple\"\nobj_id = find_and_take(obj)\nput_on(obj_id, \"table\")\n";
        assert_eq!(
            split(source).expect("split"),
            vec![
                "obj = \"apple\"",
                "obj_id = find_and_take(obj)",
                "put_on(obj_id, \"table\")"
            ]
        );
    }

    #[test]
    fn compound_statements_stay_whole() {
        let source = "for loc in locations:\n    run(f'go to {loc}')\n    if found:\n        break\nprint('done')";
        let blocks = split(source).expect("split");
        assert_eq!(blocks.len(), 2);
        assert_eq!(
            blocks[0],
            "for loc in locations:\n    run(f'go to {loc}')\n    if found:\n        break"
        );
        assert_eq!(blocks[1], "print('done')");
    }

    #[test]
    fn semicolon_statements_share_a_block() {
        assert_eq!(
            split("a = 1; b = 2\nc = 3").expect("split"),
            vec!["a = 1; b = 2", "c = 3"]
        );
    }

    #[test]
    fn splitting_a_block_again_is_identity() {
        let source = "x = [1,\n     2]\nif x:\n    y = 1\nelse:\n    y = 2\nrun('look')";
        for block in split(source).expect("split") {
            assert_eq!(split(&block).expect("resplit"), vec![block.clone()]);
        }
    }

    #[test]
    fn definitions_are_disallowed() {
        let err = split("def helper():\n    return 1\nhelper()").expect_err("def");
        assert_eq!(err, SplitError::Disallowed);
        assert_eq!(err.category(), Violation::Disallowed);
    }

    #[test]
    fn fallback_isolates_invalid_lines() {
        let source = "x = 1\ny = = 2\nif x:\n    z = 3\nelse:\n    z = 4\nw = 5";
        let blocks = split(source).expect("split");
        assert_eq!(
            blocks,
            vec!["x = 1", "y = = 2", "if x:\n    z = 3\nelse:\n    z = 4", "w = 5"]
        );
        let err = validate(&blocks).expect_err("invalid");
        assert!(matches!(err, SplitError::Invalid { index: 1, .. }));
        assert_eq!(err.category(), Violation::Syntax);
    }

    #[test]
    fn fallback_keeps_trailing_incomplete_statement() {
        let blocks = split("a = 1\nb = = 2\nfoo(1,").expect("split");
        assert_eq!(blocks, vec!["a = 1", "b = = 2", "foo(1,"]);
        let err = validate(&blocks[2..]).expect_err("incomplete");
        assert!(matches!(err, SplitError::Incomplete { index: 0, .. }));
    }

    #[test]
    fn validate_accepts_plain_blocks() {
        let blocks = vec!["x = 1".to_string(), "for i in range(3):\n    run('look')".to_string()];
        assert!(validate(&blocks).is_ok());
    }

    #[test]
    fn validate_rejects_nested_definition() {
        let blocks = vec!["if True:\n    def f():\n        pass".to_string()];
        assert_eq!(validate(&blocks), Err(SplitError::Disallowed));
    }

    #[test]
    fn lambda_and_async_def_are_definitions() {
        assert_eq!(validate(&["f = lambda x: x".to_string()]), Err(SplitError::Disallowed));
        assert_eq!(
            validate(&["async def f():\n    pass".to_string()]),
            Err(SplitError::Disallowed)
        );
        assert!(SplitError::Disallowed.to_string().contains("lambda"));
    }
}
