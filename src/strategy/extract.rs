//! Source code extraction from free-form generator replies.

use regex::Regex;

/// A fenced markdown block.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FencedBlock<'a> {
    language: &'a str,
    body: &'a str,
}

fn fenced_blocks(response: &str) -> Vec<FencedBlock<'_>> {
    let Ok(re) = Regex::new(r"(?s)```[ \t]*([A-Za-z0-9_+#.\-]*)[ \t]*\r?\n(.*?)```") else {
        return Vec::new();
    };
    re.captures_iter(response)
        .filter_map(|caps| {
            Some(FencedBlock {
                language: caps.get(1)?.as_str(),
                body: caps.get(2)?.as_str(),
            })
        })
        .collect()
}

fn starts_definition(line: &str) -> bool {
    let line = line.trim_start();
    ["def ", "async def ", "class ", "import ", "from "]
        .iter()
        .any(|prefix| line.starts_with(prefix))
}

/// Pulls the candidate program out of a generator reply.
///
/// Among fenced blocks the first one defining a function wins, otherwise
/// the last block. An unterminated fence yields everything after it.
/// Without fences, the reply is taken from the first line that starts a
/// definition or import; failing that, the whole trimmed reply.
pub fn extract_code(response: &str) -> String {
    if response.contains("```") {
        let blocks = fenced_blocks(response);
        let preferred = blocks
            .iter()
            .find(|block| block.body.contains("def "))
            .or_else(|| blocks.last());
        if let Some(block) = preferred {
            return block.body.trim_end().to_string();
        }

        if let Some(start) = response.find("```") {
            let after = &response[start + 3..];
            let body = after.split_once('\n').map(|(_, rest)| rest).unwrap_or(after);
            return body.trim_end_matches('`').trim().to_string();
        }
    }

    let trimmed = response.trim();
    let lines: Vec<&str> = trimmed.lines().collect();
    match lines.iter().position(|line| starts_definition(line)) {
        Some(start) => lines[start..].join("\n").trim().to_string(),
        None => trimmed.to_string(),
    }
}
