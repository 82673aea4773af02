//! Reading and writing task markdown files.
//!
//! A task file is YAML front matter between `---` lines followed by a
//! markdown body:
//!
//! ```text
//! ---
//! role: developer
//! priority: high
//! ---
//!
//! # Implement parser
//!
//! Free-form description.
//!
//! ## TODOs
//! - [ ] (role: tester) Write the tests
//! - [x] Sketch the grammar
//!   Report lines are indented under their item.
//!
//! ## Subtasks
//! - [ ] (subtask: T2abcd-lexer) Lexer
//!
//! ## Progress
//! Notes.
//! ```
//!
//! Sections before the first list or progress section make up the body.
//! Unrecognized sections after it are kept as trailing content. Lines in a
//! list section that are neither items nor indented report lines are kept
//! verbatim and written back at the end of the `## TODOs` section.

use std::fs;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Error, Result};
use crate::tasks::models::{Metadata, Task, TodoItem};

/// A plain TODO line.
static TODO_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:\d+\.|-)\s*\[([ xX])\]\s*(?:\(role:\s*([^)]+)\)\s*)?(.*)$").unwrap()
});

/// A TODO line linking a child task.
static SUBTASK_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-\s*\[([ xX])\]\s*\(subtask:\s*([^)]+)\)\s*(.*)$").unwrap());

/// Line number embedded in a YAML error message.
static YAML_LINE_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"line (\d+)").unwrap());

/// A markdown section delimited by `#` or `##` headings.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Section {
    /// 0 for text before the first heading, otherwise the heading level.
    pub level: u8,
    /// Heading text, trimmed.
    pub heading: String,
    /// Section text, trimmed.
    pub content: String,
}

/// Items parsed out of a list section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedItems {
    /// Plain TODO entries.
    pub todos: Vec<TodoItem>,
    /// Entries linking child tasks.
    pub subtasks: Vec<TodoItem>,
    /// Lines that matched neither grammar.
    pub stray_lines: Vec<String>,
}

enum LastItem {
    None,
    Todo,
    Subtask,
}

fn heading_of(trimmed: &str) -> Option<(u8, &str)> {
    if let Some(rest) = trimmed.strip_prefix("# ") {
        Some((1, rest.trim()))
    } else if let Some(rest) = trimmed.strip_prefix("## ") {
        Some((2, rest.trim()))
    } else {
        None
    }
}

/// Split markdown into sections at level 1 and level 2 headings.
///
/// Headings inside fenced code blocks are treated as text.
#[must_use]
pub fn split_by_headings(body: &str) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut current: Option<Section> = None;
    let mut in_fence = false;

    for line in body.split('\n') {
        let trimmed = line.trim();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
        } else if !in_fence {
            if let Some((level, heading)) = heading_of(trimmed) {
                if let Some(done) = current.take() {
                    sections.push(done);
                }
                current = Some(Section { level, heading: heading.to_string(), content: String::new() });
                continue;
            }
        }

        let section = current.get_or_insert_with(Section::default);
        if !section.content.is_empty() {
            section.content.push('\n');
        }
        section.content.push_str(line);
    }

    if let Some(done) = current {
        sections.push(done);
    }
    for section in &mut sections {
        section.content = section.content.trim().to_string();
    }
    sections
}

/// First level-1 heading in `content`.
#[must_use]
pub fn extract_title(content: &str) -> Option<String> {
    split_by_headings(content)
        .into_iter()
        .find(|section| section.level == 1)
        .map(|section| section.heading)
}

fn checked(mark: &str) -> bool {
    mark.eq_ignore_ascii_case("x")
}

fn capture(caps: &regex::Captures<'_>, i: usize) -> String {
    caps.get(i).map_or("", |m| m.as_str()).trim().to_string()
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Parse the lines of a list section.
#[must_use]
pub fn parse_items(content: &str) -> ParsedItems {
    let mut parsed = ParsedItems::default();
    let mut last = LastItem::None;

    for line in content.split('\n') {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if let Some(caps) = SUBTASK_PATTERN.captures(trimmed) {
            parsed.subtasks.push(TodoItem {
                index: parsed.subtasks.len() + 1,
                checked: checked(&caps[1]),
                subtask_id: non_empty(capture(&caps, 2)),
                text: capture(&caps, 3),
                raw: trimmed.to_string(),
                ..TodoItem::default()
            });
            last = LastItem::Subtask;
            continue;
        }

        if let Some(caps) = TODO_PATTERN.captures(trimmed) {
            parsed.todos.push(TodoItem {
                index: parsed.todos.len() + 1,
                checked: checked(&caps[1]),
                role: non_empty(capture(&caps, 2)),
                text: capture(&caps, 3),
                raw: trimmed.to_string(),
                ..TodoItem::default()
            });
            last = LastItem::Todo;
            continue;
        }

        let indented = line.starts_with("  ") || line.starts_with('\t');
        let owner = match (indented, &last) {
            (true, LastItem::Todo) => parsed.todos.last_mut(),
            (true, LastItem::Subtask) => parsed.subtasks.last_mut(),
            _ => None,
        };
        match owner {
            Some(item) => {
                let report = item.report.get_or_insert_with(String::new);
                if !report.is_empty() {
                    report.push('\n');
                }
                report.push_str(trimmed);
            }
            None => parsed.stray_lines.push(trimmed.to_string()),
        }
    }

    parsed
}

fn is_delimiter(line: &str) -> bool {
    let line = line.trim_end();
    line.len() >= 3 && line.bytes().all(|b| b == b'-')
}

/// Split front matter from the body. `None` if either delimiter is missing.
fn split_frontmatter(content: &str) -> Option<(String, String)> {
    let lines: Vec<&str> = content.split('\n').collect();
    if !is_delimiter(lines.first()?) {
        return None;
    }
    let close = lines.iter().skip(1).position(|line| is_delimiter(line))? + 1;
    Some((lines[1..close].join("\n"), lines[close + 1..].join("\n")))
}

fn decode_metadata(yaml: &str, path: &Path) -> Result<Metadata> {
    if yaml.trim().is_empty() {
        return Ok(Metadata::default());
    }
    serde_yaml::from_str(yaml).map_err(|err| {
        let message = err.to_string();
        // +1 for the opening delimiter line
        let yaml_line = err.location().map(|loc| loc.line()).or_else(|| {
            YAML_LINE_PATTERN
                .captures(&message)
                .and_then(|caps| caps[1].parse::<usize>().ok())
        });
        Error::FrontmatterParse {
            path: path.to_path_buf(),
            line: yaml_line.map_or(0, |line| line + 1),
            message,
        }
    })
}

fn section_text(section: &Section) -> String {
    let marker = if section.level == 1 { "#" } else { "##" };
    if section.content.is_empty() {
        format!("{marker} {}", section.heading)
    } else {
        format!("{marker} {}\n{}", section.heading, section.content)
    }
}

fn parse_with_path(content: &str, id: &str, path: &Path) -> Result<Task> {
    let normalized = content.strip_prefix('\u{feff}').unwrap_or(content).replace("\r\n", "\n");
    let (yaml, body) = split_frontmatter(&normalized)
        .ok_or_else(|| Error::InvalidFrontmatter { path: path.to_path_buf() })?;
    let meta = decode_metadata(&yaml, path)?;

    let mut task = Task { id: id.to_string(), meta, ..Task::default() };
    let mut body_parts: Vec<String> = Vec::new();
    let mut other_parts: Vec<String> = Vec::new();
    let mut progress_parts: Vec<String> = Vec::new();
    let mut seen_special = false;

    for section in split_by_headings(&body) {
        let name = section.heading.to_lowercase();
        let text = match section.level {
            0 => section.content,
            1 if task.title.is_empty() => {
                // Prose under the title is description even after a list section.
                task.title = section.heading;
                if !section.content.is_empty() {
                    body_parts.push(section.content);
                }
                continue;
            }
            2 if matches!(name.as_str(), "todos" | "tasks" | "subtasks") => {
                let items = parse_items(&section.content);
                task.todo_items.extend(items.todos);
                task.subtask_items.extend(items.subtasks);
                task.stray_item_lines.extend(items.stray_lines);
                seen_special = true;
                continue;
            }
            2 if name == "progress" => {
                if !section.content.is_empty() {
                    progress_parts.push(section.content);
                }
                seen_special = true;
                continue;
            }
            _ => section_text(&section),
        };
        if text.is_empty() {
            continue;
        }
        if seen_special {
            other_parts.push(text);
        } else {
            body_parts.push(text);
        }
    }

    task.body = body_parts.join("\n\n");
    task.other = other_parts.join("\n\n");
    task.progress = progress_parts.join("\n\n");
    task.renumber();
    Ok(task)
}

/// Parse task markdown into a [`Task`] with the given ID.
///
/// # Errors
///
/// Returns [`Error::InvalidFrontmatter`] if the front matter delimiters are
/// missing and [`Error::FrontmatterParse`] if the YAML cannot be decoded.
pub fn parse(content: &str, id: &str) -> Result<Task> {
    parse_with_path(content, id, Path::new(""))
}

/// Parse a task file. The task ID is the name of the directory holding it.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn parse_file(path: &Path) -> Result<Task> {
    let content = fs::read_to_string(path)?;
    let dir = path.parent().unwrap_or_else(|| Path::new(""));
    let id = dir.file_name().map(|name| name.to_string_lossy().into_owned()).unwrap_or_default();
    let mut task = parse_with_path(&content, &id, path)?;
    task.file_path = path.to_path_buf();
    task.dir = dir.to_path_buf();
    Ok(task)
}

fn push_items(out: &mut String, items: &[TodoItem]) {
    for item in items {
        out.push_str(&item.to_markdown());
        out.push('\n');
    }
}

/// Render a task in its on-disk form.
pub(crate) fn render(task: &Task) -> Result<String> {
    let yaml = serde_yaml::to_string(&task.meta)?;
    let mut out = String::from("---\n");
    out.push_str(&yaml);
    if !yaml.ends_with('\n') {
        out.push('\n');
    }
    out.push_str("---\n\n");

    if !task.title.is_empty() {
        out.push_str("# ");
        out.push_str(&task.title);
        out.push_str("\n\n");
    }
    if !task.body.is_empty() {
        out.push_str(&task.body);
        out.push_str("\n\n");
    }
    if !task.todo_items.is_empty() || !task.stray_item_lines.is_empty() {
        out.push_str("## TODOs\n");
        push_items(&mut out, &task.todo_items);
        for line in &task.stray_item_lines {
            out.push_str(line);
            out.push('\n');
        }
        out.push('\n');
    }
    if !task.subtask_items.is_empty() {
        out.push_str("## Subtasks\n");
        push_items(&mut out, &task.subtask_items);
        out.push('\n');
    }
    if !task.progress.is_empty() {
        out.push_str("## Progress\n");
        out.push_str(&task.progress);
        out.push_str("\n\n");
    }
    if !task.other.is_empty() {
        out.push_str(&task.other);
        out.push('\n');
    }

    Ok(format!("{}\n", out.trim_end_matches('\n')))
}

/// Keep only free-form sections of `body`, dropping titles and list or
/// progress sections.
pub(crate) fn clean_body(body: &str) -> String {
    let mut parts = Vec::new();
    for section in split_by_headings(body) {
        let name = section.heading.to_lowercase();
        if section.level == 2 && matches!(name.as_str(), "todos" | "tasks" | "subtasks" | "progress") {
            continue;
        }
        // A title heading is dropped but the prose under it is kept.
        let text = if section.level <= 1 { section.content } else { section_text(&section) };
        if !text.is_empty() {
            parts.push(text);
        }
    }
    parts.join("\n\n")
}
