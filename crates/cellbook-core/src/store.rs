//! In-memory document store with snapshot-based change notification.

use std::sync::Arc;

use tokio::sync::watch;

use crate::notebook::{Cell, Notebook};
use crate::outcome::ExecutionOutcome;

/// Canonical in-memory notebook state.
///
/// Every mutation replaces the published snapshot wholesale: observers
/// see either the pre- or post-mutation notebook, never an intermediate
/// state. Knows nothing about networking; the coordinator drives it.
pub struct DocumentStore {
    state: watch::Sender<Option<Arc<Notebook>>>,
}

impl Default for DocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        let (state, _) = watch::channel(None);
        Self { state }
    }

    /// Replace the entire notebook state. Used on initial load.
    pub fn set_notebook(&self, notebook: Notebook) {
        self.state.send_replace(Some(Arc::new(notebook)));
    }

    /// Current snapshot, if a notebook is loaded.
    #[must_use]
    pub fn snapshot(&self) -> Option<Arc<Notebook>> {
        self.state.borrow().clone()
    }

    /// Subscribe to snapshot changes.
    ///
    /// Each observed value is a complete immutable snapshot.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<Notebook>>> {
        self.state.subscribe()
    }

    /// Insert a cell, or replace the cell with the same id in place.
    ///
    /// Replacement preserves the cell's position; insertion appends.
    pub fn upsert_cell(&self, cell: Cell) {
        self.mutate(|notebook| {
            if let Some(existing) = notebook.cells.iter_mut().find(|c| c.id == cell.id) {
                *existing = cell;
            } else {
                notebook.cells.push(cell);
            }
            true
        });
    }

    /// Remove a cell by id. Removing a non-existent id is a no-op.
    pub fn remove_cell(&self, cell_id: &str) {
        self.mutate(|notebook| {
            let before = notebook.cells.len();
            notebook.cells.retain(|c| c.id != cell_id);
            notebook.cells.len() != before
        });
    }

    /// Set a cell's output.
    ///
    /// If the cell no longer exists the call is a no-op; this is how
    /// orphaned execution results are discarded. Returns whether the
    /// outcome was applied.
    pub fn apply_outcome(&self, cell_id: &str, outcome: ExecutionOutcome) -> bool {
        self.mutate(|notebook| {
            if let Some(cell) = notebook.cells.iter_mut().find(|c| c.id == cell_id) {
                cell.output = Some(outcome);
                true
            } else {
                false
            }
        })
    }

    /// Clone-apply-publish. The closure returns whether anything changed;
    /// unchanged notebooks are not republished.
    fn mutate(&self, apply: impl FnOnce(&mut Notebook) -> bool) -> bool {
        let mut changed = false;
        self.state.send_if_modified(|state| {
            let Some(current) = state.as_ref() else {
                return false;
            };
            let mut next = Notebook::clone(current);
            changed = apply(&mut next);
            if changed {
                *state = Some(Arc::new(next));
            }
            changed
        });
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notebook::CellKind;

    fn store_with_cells(ids: &[&str]) -> DocumentStore {
        let store = DocumentStore::new();
        let mut notebook = Notebook::new("n1", "test");
        for id in ids {
            notebook.cells.push(Cell::code(*id, "int main() {}"));
        }
        store.set_notebook(notebook);
        store
    }

    #[test]
    fn test_set_notebook_replaces_state() {
        let store = store_with_cells(&["c1"]);
        store.set_notebook(Notebook::new("n2", "other"));

        let snapshot = store.snapshot().unwrap();
        assert_eq!(snapshot.id, "n2");
        assert!(snapshot.cells.is_empty());
    }

    #[test]
    fn test_upsert_preserves_position() {
        let store = store_with_cells(&["c1", "c2", "c3"]);

        let mut replacement = Cell::code("c2", "int x;");
        replacement.kind = CellKind::Code;
        store.upsert_cell(replacement);

        let snapshot = store.snapshot().unwrap();
        let ids: Vec<&str> = snapshot.cells.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["c1", "c2", "c3"]);
        assert_eq!(snapshot.cell("c2").unwrap().content, "int x;");
    }

    #[test]
    fn test_upsert_appends_new_cell() {
        let store = store_with_cells(&["c1"]);
        store.upsert_cell(Cell::markdown("c2", "notes"));

        let snapshot = store.snapshot().unwrap();
        assert_eq!(snapshot.cells.len(), 2);
        assert_eq!(snapshot.cells[1].id, "c2");
    }

    #[test]
    fn test_remove_missing_cell_is_noop() {
        let store = store_with_cells(&["c1"]);
        store.remove_cell("nope");
        assert_eq!(store.snapshot().unwrap().cells.len(), 1);
    }

    #[test]
    fn test_apply_outcome_to_missing_cell_is_noop() {
        let store = store_with_cells(&["c1"]);
        assert!(!store.apply_outcome("ghost", ExecutionOutcome::Pending));

        let snapshot = store.snapshot().unwrap();
        assert!(snapshot.cell("c1").unwrap().output.is_none());
    }

    #[test]
    fn test_snapshots_are_immutable() {
        let store = store_with_cells(&["c1"]);
        let before = store.snapshot().unwrap();

        assert!(store.apply_outcome("c1", ExecutionOutcome::Pending));

        // The earlier snapshot is untouched by the mutation.
        assert!(before.cell("c1").unwrap().output.is_none());
        let after = store.snapshot().unwrap();
        assert_eq!(
            after.cell("c1").unwrap().output,
            Some(ExecutionOutcome::Pending)
        );
    }

    #[tokio::test]
    async fn test_subscribe_observes_mutations() {
        let store = store_with_cells(&["c1"]);
        let mut rx = store.subscribe();
        rx.mark_unchanged();

        store.apply_outcome("c1", ExecutionOutcome::Pending);
        rx.changed().await.unwrap();

        let observed = rx.borrow().clone().unwrap();
        assert_eq!(
            observed.cell("c1").unwrap().output,
            Some(ExecutionOutcome::Pending)
        );
    }
}
