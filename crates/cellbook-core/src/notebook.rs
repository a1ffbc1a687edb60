//! Notebook document model.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::outcome::ExecutionOutcome;

/// Notebook identifier, assigned by the persistence backend.
pub type NotebookId = String;

/// Cell identifier, unique within its notebook for the cell's lifetime.
pub type CellId = String;

/// Kind of notebook cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellKind {
    /// Executable C/C++ source.
    Code,
    /// Rendered markdown.
    Markdown,
}

/// Source language of a code cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    C,
    Cpp,
}

impl Language {
    /// Wire name of the language (`"c"` or `"cpp"`).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::C => "c",
            Self::Cpp => "cpp",
        }
    }
}

/// A unit of notebook content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cell {
    /// Unique cell identifier (immutable).
    pub id: CellId,
    /// Cell kind.
    pub kind: CellKind,
    /// Source text or markdown body.
    pub content: String,
    /// Latest execution outcome, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<ExecutionOutcome>,
}

impl Cell {
    /// Create a code cell with no output.
    #[must_use]
    pub fn code(id: impl Into<CellId>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: CellKind::Code,
            content: content.into(),
            output: None,
        }
    }

    /// Create a markdown cell.
    #[must_use]
    pub fn markdown(id: impl Into<CellId>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: CellKind::Markdown,
            content: content.into(),
            output: None,
        }
    }
}

/// An ordered notebook document.
///
/// `cells` order is the document's visual order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notebook {
    /// Unique notebook identifier.
    pub id: NotebookId,
    /// Notebook title.
    pub title: String,
    /// Cells in visual order.
    pub cells: Vec<Cell>,
    /// Creation timestamp (Unix epoch seconds).
    pub created_at: i64,
    /// Last update timestamp.
    pub updated_at: i64,
}

impl Notebook {
    /// Create an empty notebook.
    #[must_use]
    pub fn new(id: impl Into<NotebookId>, title: impl Into<String>) -> Self {
        let timestamp = now();
        Self {
            id: id.into(),
            title: title.into(),
            cells: Vec::new(),
            created_at: timestamp,
            updated_at: timestamp,
        }
    }

    /// Look up a cell by id.
    #[must_use]
    pub fn cell(&self, cell_id: &str) -> Option<&Cell> {
        self.cells.iter().find(|c| c.id == cell_id)
    }

    /// Whether a cell with the given id exists.
    #[must_use]
    pub fn contains_cell(&self, cell_id: &str) -> bool {
        self.cell(cell_id).is_some()
    }
}

/// Current Unix timestamp in seconds.
#[must_use]
pub fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_wire_names() {
        assert_eq!(serde_json::to_string(&Language::C).unwrap(), "\"c\"");
        assert_eq!(serde_json::to_string(&Language::Cpp).unwrap(), "\"cpp\"");
    }

    #[test]
    fn test_cell_kind_serialization() {
        let cell = Cell::markdown("m1", "# Title");
        let json = serde_json::to_string(&cell).unwrap();
        assert!(json.contains("\"markdown\""));
        assert!(!json.contains("output"));
    }

    #[test]
    fn test_cell_lookup() {
        let mut nb = Notebook::new("n1", "scratch");
        nb.cells.push(Cell::code("c1", "int main() { return 0; }"));

        assert!(nb.contains_cell("c1"));
        assert!(!nb.contains_cell("c2"));
        assert_eq!(nb.cell("c1").unwrap().kind, CellKind::Code);
    }
}
