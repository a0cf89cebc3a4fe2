//! Parsing of free-form generator responses.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::types::Plan;

/// A fenced block: opening and closing fences each on their own line.
static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?msR)^[ \t]*```([^\r\n]*)\r?\n(.*?)^[ \t]*```[ \t]*$")
        .expect("fence regex is valid")
});

static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#+\s*(.*?)\s*#*$").expect("heading regex is valid"));

/// Extract program text from a response.
///
/// Takes the first block tagged as Python, then the first untagged block, and
/// otherwise the whole response.
pub fn extract_code(response: &str) -> String {
    let mut untagged = None;
    for caps in FENCE_RE.captures_iter(response) {
        let (Some(info), Some(body)) = (caps.get(1), caps.get(2)) else {
            continue;
        };
        let lang = info
            .as_str()
            .split_whitespace()
            .next()
            .unwrap_or("")
            .to_ascii_lowercase();
        if is_python_tag(&lang) {
            return body.as_str().trim().to_string();
        }
        if lang.is_empty() && untagged.is_none() {
            untagged = Some(body.as_str());
        }
    }
    untagged.unwrap_or(response).trim().to_string()
}

fn is_python_tag(lang: &str) -> bool {
    matches!(lang, "py" | "python" | "python3" | "py3")
}

/// Return the trimmed body under the markdown heading named `heading`
/// (any heading level, case-insensitive), or `None` when absent.
pub fn markdown_section(text: &str, heading: &str) -> Option<String> {
    let mut capture = false;
    let mut found = false;
    let mut lines = Vec::new();
    for line in text.lines() {
        let trimmed = line.trim();
        if let Some(caps) = HEADING_RE.captures(trimmed) {
            let title = caps.get(1).map_or("", |m| m.as_str());
            capture = title.eq_ignore_ascii_case(heading);
            found |= capture;
            continue;
        }
        if capture {
            lines.push(trimmed);
        }
    }
    found.then(|| lines.join("\n").trim().to_string())
}

/// Build a [`Plan`] from a planner response with `Plan` and `Elements` sections.
pub fn parse_plan(response: &str) -> Plan {
    let outline = markdown_section(response, "Plan").unwrap_or_else(|| response.trim().to_string());
    let elements = markdown_section(response, "Elements")
        .map(|body| {
            body.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    Plan::new(outline, elements)
}
