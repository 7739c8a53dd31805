//! Markdown to Google Docs `batchUpdate` requests, and text chunking.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Value, json};

static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(#{1,6})\s+(.+)").expect("heading regex"));

/// One `insertText` per line, in order, starting at document index 1.
///
/// ATX headings lose their `#` marks and get an `updateParagraphStyle`
/// with `HEADING_<n>`. Indices count UTF-16 code units, as the Docs API does.
pub fn markdown_to_requests(markdown: &str) -> Vec<Value> {
    let mut requests = Vec::new();
    let mut index = 1usize;

    for line in markdown.split('\n') {
        if line.trim().is_empty() {
            requests.push(insert_text(index, "\n"));
            index += 1;
            continue;
        }

        if let Some(caps) = HEADING_RE.captures(line) {
            let level = caps[1].len();
            let text = format!("{}\n", &caps[2]);
            let len = utf16_len(&text);

            requests.push(insert_text(index, &text));
            requests.push(json!({
                "updateParagraphStyle": {
                    "range": { "startIndex": index, "endIndex": index + len - 1 },
                    "paragraphStyle": { "namedStyleType": format!("HEADING_{level}") },
                    "fields": "namedStyleType",
                }
            }));
            index += len;
            continue;
        }

        let text = format!("{line}\n");
        requests.push(insert_text(index, &text));
        index += utf16_len(&text);
    }

    requests
}

pub(crate) fn insert_text(index: usize, text: &str) -> Value {
    json!({
        "insertText": {
            "location": { "index": index },
            "text": text,
        }
    })
}

fn utf16_len(s: &str) -> usize {
    s.encode_utf16().count()
}

/// Split `text` into pieces of at most `max_len` characters, cutting after a
/// paragraph break, else after a sentence end, else after a space.
pub fn chunk_text(text: &str, max_len: usize) -> Vec<&str> {
    if max_len == 0 || text.chars().count() <= max_len {
        return vec![text];
    }

    let mut chunks = Vec::new();
    let mut rest = text;
    while !rest.is_empty() {
        let Some((cut, _)) = rest.char_indices().nth(max_len) else {
            chunks.push(rest);
            break;
        };

        let window = &rest[..cut];
        let end = window
            .rfind("\n\n")
            .filter(|&i| i > 0)
            .map(|i| i + 2)
            .or_else(|| window.rfind(". ").filter(|&i| i > 0).map(|i| i + 2))
            .or_else(|| window.rfind(' ').filter(|&i| i > 0).map(|i| i + 1))
            .unwrap_or(cut);

        chunks.push(&rest[..end]);
        rest = &rest[end..];
    }
    chunks
}
