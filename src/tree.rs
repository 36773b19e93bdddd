//! Collapsible tree view over arbitrary JSON values.
//!
//! [`lines`] walks the value lazily with an explicit stack, so nesting
//! depth never grows the call stack. Collapse state lives in a flat map
//! keyed by dotted structural path (`root.certificates.0.subject`).

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;

pub const ROOT_PATH: &str = "root";

/// Per-path collapsed flags. Absent means expanded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TreeViewState {
    collapsed: HashMap<String, bool>,
}

impl TreeViewState {
    pub fn is_collapsed(&self, path: &str) -> bool {
        self.collapsed.get(path).copied().unwrap_or(false)
    }

    /// Flips one path and returns its new collapsed flag.
    pub fn toggle(&mut self, path: &str) -> bool {
        let flag = self.collapsed.entry(path.to_string()).or_insert(false);
        *flag = !*flag;
        *flag
    }

    pub fn collapse(&mut self, path: &str) {
        self.collapsed.insert(path.to_string(), true);
    }

    pub fn expand(&mut self, path: &str) {
        self.collapsed.insert(path.to_string(), false);
    }

    pub fn clear(&mut self) {
        self.collapsed.clear();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum LineKind {
    Scalar { text: String },
    Empty { token: &'static str },
    Open { bracket: char },
    Collapsed { open: char, close: char },
    Close { bracket: char },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeLine {
    pub depth: usize,
    pub path: String,
    /// Object member key; `None` for sequence items, the root and closers.
    pub label: Option<String>,
    #[serde(flatten)]
    pub kind: LineKind,
    pub trailing_comma: bool,
}

impl TreeLine {
    /// Whether this line carries a collapse toggle.
    pub fn togglable(&self) -> bool {
        matches!(self.kind, LineKind::Open { .. } | LineKind::Collapsed { .. })
    }
}

enum Children<'a> {
    Object(serde_json::map::Iter<'a>),
    Array(std::iter::Enumerate<std::slice::Iter<'a, Value>>),
}

impl<'a> Children<'a> {
    fn next(&mut self) -> Option<(String, Option<String>, &'a Value)> {
        match self {
            Children::Object(iter) => iter
                .next()
                .map(|(key, value)| (key.clone(), Some(key.clone()), value)),
            Children::Array(iter) => iter
                .next()
                .map(|(index, value)| (index.to_string(), None, value)),
        }
    }

    fn remaining(&self) -> usize {
        match self {
            Children::Object(iter) => iter.len(),
            Children::Array(iter) => iter.len(),
        }
    }
}

struct Level<'a> {
    children: Children<'a>,
    path: String,
    depth: usize,
    close: char,
    trailing_comma: bool,
}

/// Lazy line iterator. Create a fresh one to re-render.
pub struct TreeLines<'a> {
    state: &'a TreeViewState,
    root: Option<&'a Value>,
    stack: Vec<Level<'a>>,
}

pub fn lines<'a>(value: &'a Value, state: &'a TreeViewState) -> TreeLines<'a> {
    TreeLines {
        state,
        root: Some(value),
        stack: Vec::new(),
    }
}

impl<'a> TreeLines<'a> {
    fn enter(
        &mut self,
        value: &'a Value,
        path: String,
        label: Option<String>,
        depth: usize,
        trailing_comma: bool,
    ) -> TreeLine {
        let (children, open, close) = match value {
            Value::Object(map) if map.is_empty() => {
                return TreeLine {
                    depth,
                    path,
                    label,
                    kind: LineKind::Empty { token: "{}" },
                    trailing_comma,
                };
            }
            Value::Array(items) if items.is_empty() => {
                return TreeLine {
                    depth,
                    path,
                    label,
                    kind: LineKind::Empty { token: "[]" },
                    trailing_comma,
                };
            }
            Value::Object(map) => (Children::Object(map.iter()), '{', '}'),
            Value::Array(items) => (Children::Array(items.iter().enumerate()), '[', ']'),
            scalar => {
                return TreeLine {
                    depth,
                    path,
                    label,
                    kind: LineKind::Scalar {
                        text: scalar.to_string(),
                    },
                    trailing_comma,
                };
            }
        };

        if self.state.is_collapsed(&path) {
            return TreeLine {
                depth,
                path,
                label,
                kind: LineKind::Collapsed { open, close },
                trailing_comma,
            };
        }

        self.stack.push(Level {
            children,
            path: path.clone(),
            depth,
            close,
            trailing_comma,
        });
        TreeLine {
            depth,
            path,
            label,
            kind: LineKind::Open { bracket: open },
            trailing_comma: false,
        }
    }
}

impl Iterator for TreeLines<'_> {
    type Item = TreeLine;

    fn next(&mut self) -> Option<TreeLine> {
        if let Some(root) = self.root.take() {
            return Some(self.enter(root, ROOT_PATH.to_string(), None, 0, false));
        }

        let level = self.stack.last_mut()?;
        match level.children.next() {
            Some((key, label, value)) => {
                let trailing = level.children.remaining() > 0;
                let path = format!("{}.{}", level.path, key);
                let depth = level.depth + 1;
                Some(self.enter(value, path, label, depth, trailing))
            }
            None => {
                let level = self.stack.pop()?;
                Some(TreeLine {
                    depth: level.depth,
                    path: level.path,
                    label: None,
                    kind: LineKind::Close {
                        bracket: level.close,
                    },
                    trailing_comma: level.trailing_comma,
                })
            }
        }
    }
}

/// Indented plain-text rendering, two spaces per level.
pub fn render_text<I>(lines: I) -> String
where
    I: IntoIterator<Item = TreeLine>,
{
    let mut out = String::new();
    for line in lines {
        for _ in 0..line.depth {
            out.push_str("  ");
        }
        match line.kind {
            LineKind::Open { .. } => out.push_str("▾ "),
            LineKind::Collapsed { .. } => out.push_str("▸ "),
            _ => {}
        }
        if let Some(label) = &line.label {
            out.push_str(&Value::from(label.as_str()).to_string());
            out.push_str(": ");
        }
        match &line.kind {
            LineKind::Scalar { text } => out.push_str(text),
            LineKind::Empty { token } => out.push_str(token),
            LineKind::Open { bracket } | LineKind::Close { bracket } => out.push(*bracket),
            LineKind::Collapsed { open, close } => {
                out.push(*open);
                out.push('…');
                out.push(*close);
            }
        }
        if line.trailing_comma {
            out.push(',');
        }
        out.push('\n');
    }
    out
}
