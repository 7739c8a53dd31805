//! Post-conversion cleanup for Markdown produced from documentation pages.
//!
//! Passes run in sequence over the whole document. Line-oriented passes only
//! touch prose; fenced code blocks pass through untouched.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use url::Url;

/// Site chrome that survives container extraction on common doc platforms.
const CHROME_LINES: &[&str] = &[
    "was this helpful?",
    "was this page helpful?",
    "send feedback",
    "edit this page",
    "skip to main content",
    "table of contents",
    "on this page",
];

static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(#{1,6})\s+(.+)$").expect("heading regex"));

static FENCE_LANG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\s*```)(?:language-|lang-|highlight-|sourceCode\s+)(\w[\w+-]*)")
        .expect("fence regex")
});

static WRAPPER_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"</?(?:div|span|section|article|aside|header|footer|figure|figcaption|details|summary|devsite-[\w-]+)(?:\s[^>]*)?>",
    )
    .expect("wrapper tag regex")
});

static EMPTY_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|[^!])(\[\s*\]\([^)]*\))").expect("empty link regex"));

static LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(!?)\[([^\]]*)\]\(([^)\s]+)([^)]*)\)").expect("link regex"));

/// Run every cleanup pass over raw converter output.
pub(crate) fn run_pipeline(md: &str, base_url: Option<&Url>) -> String {
    let md = map_prose_lines(md, drop_chrome_line);
    let md = map_prose_lines(&md, |line| Some(drop_empty_links(line)));
    let md = demote_extra_h1(&md);
    let md = fix_fence_languages(&md);
    let md = map_prose_lines(&md, |line| Some(WRAPPER_TAG_RE.replace_all(line, "").into_owned()));
    let md = match base_url {
        Some(base) => map_prose_lines(&md, |line| Some(absolutize_links(line, base))),
        None => md,
    };
    let md = space_headings(&md);
    finish(&md)
}

// ---------------------------------------------------------------------------
// Line plumbing
// ---------------------------------------------------------------------------

/// Apply `f` to each line outside fenced code blocks. `None` drops the line.
fn map_prose_lines(md: &str, mut f: impl FnMut(&str) -> Option<String>) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut in_code = false;

    for line in md.lines() {
        if line.trim_start().starts_with("```") {
            in_code = !in_code;
            out.push(line.to_string());
        } else if in_code {
            out.push(line.to_string());
        } else if let Some(mapped) = f(line) {
            out.push(mapped);
        }
    }

    out.join("\n")
}

// ---------------------------------------------------------------------------
// Passes
// ---------------------------------------------------------------------------

fn drop_chrome_line(line: &str) -> Option<String> {
    let normalized = line
        .trim()
        .trim_matches(|c: char| c == '*' || c == '_')
        .trim()
        .to_lowercase();
    if CHROME_LINES.contains(&normalized.as_str()) {
        None
    } else {
        Some(line.to_string())
    }
}

/// Icon-only anchors convert to `[](href)`; they carry no text.
fn drop_empty_links(line: &str) -> String {
    EMPTY_LINK_RE
        .replace_all(line, |caps: &Captures<'_>| {
            let whole = &caps[0];
            let link = &caps[1];
            whole[..whole.len() - link.len()].to_string()
        })
        .into_owned()
}

/// Keep the first H1; later ones become H2.
fn demote_extra_h1(md: &str) -> String {
    let mut seen_h1 = false;
    map_prose_lines(md, |line| match HEADING_RE.captures(line) {
        Some(caps) if &caps[1] == "#" => {
            if seen_h1 {
                Some(format!("## {}", &caps[2]))
            } else {
                seen_h1 = true;
                Some(line.to_string())
            }
        }
        _ => Some(line.to_string()),
    })
}

/// `language-js`, `lang-python`, `highlight-rust` fence hints become bare names.
fn fix_fence_languages(md: &str) -> String {
    md.lines()
        .map(|line| FENCE_LANG_RE.replace(line, "$1$2").into_owned())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Resolve relative link and image targets against the page URL.
fn absolutize_links(line: &str, base: &Url) -> String {
    LINK_RE
        .replace_all(line, |caps: &Captures<'_>| {
            let bang = &caps[1];
            let text = &caps[2];
            let href = &caps[3];
            let rest = &caps[4];

            if is_absolute_target(href) {
                return caps[0].to_string();
            }
            match base.join(href) {
                Ok(resolved) => format!("{bang}[{text}]({resolved}{rest})"),
                Err(_) => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn is_absolute_target(href: &str) -> bool {
    href.starts_with('#')
        || ["http://", "https://", "mailto:", "tel:", "data:"]
            .iter()
            .any(|scheme| href.starts_with(scheme))
}

/// Headings get a blank line on both sides.
fn space_headings(md: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut in_code = false;
    let mut pad_next = false;

    for line in md.lines() {
        let is_fence = line.trim_start().starts_with("```");
        let is_heading = !in_code && !is_fence && HEADING_RE.is_match(line);

        if pad_next && !line.trim().is_empty() {
            out.push(String::new());
        }
        pad_next = false;

        if is_heading {
            if out.last().is_some_and(|prev| !prev.trim().is_empty()) {
                out.push(String::new());
            }
            pad_next = true;
        }
        if is_fence {
            in_code = !in_code;
        }
        out.push(line.to_string());
    }

    out.join("\n")
}

/// Trim trailing whitespace, collapse blank runs outside code, and end with
/// exactly one newline.
fn finish(md: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    let mut in_code = false;

    for line in md.lines() {
        let line = line.trim_end();
        if line.trim_start().starts_with("```") {
            in_code = !in_code;
        }
        let blank = line.is_empty();
        if !in_code && blank && out.last().is_none_or(|prev| prev.is_empty()) {
            continue;
        }
        out.push(line);
    }

    while out.last().is_some_and(|l| l.is_empty()) {
        out.pop();
    }

    let mut result = out.join("\n");
    result.push('\n');
    result
}
