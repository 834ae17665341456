//! Markdown content edits that feed the editor.
//!
//! Each helper returns the full new content plus the selection the view
//! should restore; callers hand `TextEdit::into_patch()` to the editor.
//! Ranges are byte offsets and are snapped to char boundaries.

use crate::model::note::NotePatch;
use once_cell::sync::Lazy;
use regex::Regex;
use std::ops::Range;

static TASK_LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<bullet>\s*[-*+] )\[[ xX]\] (?P<text>.*?)(?P<tail>[ \t\r]*)$")
        .expect("valid task line regex")
});

/// Rewritten content and the selection to restore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEdit {
    pub content: String,
    pub selection: Range<usize>,
}

impl TextEdit {
    pub fn into_patch(self) -> NotePatch {
        NotePatch::content(self.content)
    }
}

/// Sets every task-list item whose whole text equals `task_text` to
/// `checked`. Both `[x]` and `[X]` count as checked; trailing whitespace on
/// the line is ignored and kept.
pub fn toggle_task_checkbox(content: &str, task_text: &str, checked: bool) -> String {
    let task_text = task_text.trim();
    let marker = if checked { 'x' } else { ' ' };
    content
        .split('\n')
        .map(|line| match TASK_LINE_RE.captures(line) {
            Some(caps) if &caps["text"] == task_text => {
                format!("{}[{marker}] {task_text}{}", &caps["bullet"], &caps["tail"])
            }
            _ => line.to_string(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Returns whether a list line starts with a task checkbox after its bullet.
pub fn is_task_line(line: &str) -> bool {
    TASK_LINE_RE.is_match(line)
}

/// Surrounds the selection with `before` and `after`; the cursor lands after
/// the closing marker.
pub fn wrap_selection(content: &str, selection: Range<usize>, before: &str, after: &str) -> TextEdit {
    let selection = snap_range(content, selection);
    let selected = &content[selection.clone()];

    let mut next = String::with_capacity(content.len() + before.len() + after.len());
    next.push_str(&content[..selection.start]);
    next.push_str(before);
    next.push_str(selected);
    next.push_str(after);
    next.push_str(&content[selection.end..]);

    let cursor = selection.start + before.len() + selected.len() + after.len();
    TextEdit {
        content: next,
        selection: cursor..cursor,
    }
}

/// Prefixes every line touched by the selection with `prefix`, skipping
/// lines that already carry it. The new selection spans the edited lines.
pub fn prefix_lines(content: &str, selection: Range<usize>, prefix: &str) -> TextEdit {
    let selection = snap_range(content, selection);
    let line_start = content[..selection.start]
        .rfind('\n')
        .map_or(0, |idx| idx + 1);
    let line_end = content[selection.end..]
        .find('\n')
        .map_or(content.len(), |idx| selection.end + idx);

    let edited = content[line_start..line_end]
        .split('\n')
        .map(|line| {
            if line.starts_with(prefix) {
                line.to_string()
            } else {
                format!("{prefix}{line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n");

    let mut next = String::with_capacity(content.len() + edited.len());
    next.push_str(&content[..line_start]);
    next.push_str(&edited);
    next.push_str(&content[line_end..]);

    TextEdit {
        content: next,
        selection: line_start..line_start + edited.len(),
    }
}

fn snap_range(content: &str, range: Range<usize>) -> Range<usize> {
    let mut start = range.start.min(content.len());
    let mut end = range.end.min(content.len()).max(start);
    while !content.is_char_boundary(start) {
        start -= 1;
    }
    while !content.is_char_boundary(end) {
        end += 1;
    }
    start..end
}
