use std::time::{Duration, Instant};

use crossterm::event::KeyEvent;

use crate::bridge::ExecutionBridge;
use crate::cells::{CellId, Notebook, NotebookAction, Position};
use crate::clipboard::{self, Copied};
use crate::editor::{CompletionConfig, EditorCommand, EditorSurface, KeyBindings};
use crate::sql_format::format_sql;

/// Pause between a successful run and scrolling its result into view.
pub const REVEAL_DELAY: Duration = Duration::from_millis(100);

/// Spaces inserted by Tab when there is no word to complete.
const INDENT: &str = "    ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
    Normal,
    Editing,
}

pub struct App {
    pub should_quit: bool,

    // UI state
    pub mode: AppMode,
    pub status: String,
    pub show_help: bool,

    pub notebook: Notebook,

    // Editor attached to the active cell
    pub editor: Box<dyn EditorSurface>,
    pub bindings: KeyBindings,
    pub completion: CompletionConfig,

    pub bridge: ExecutionBridge,
    /// Executor description shown in the status bar
    pub backend: String,

    /// Index of the first cell drawn at the top of the notebook pane
    pub scroll: usize,
    /// Cell the next draw must bring fully into view; taken by the UI layer
    pub reveal: Option<CellId>,
    pending_reveals: Vec<(CellId, Instant)>,
}

impl App {
    pub fn new(
        notebook: Notebook,
        editor: Box<dyn EditorSurface>,
        bridge: ExecutionBridge,
        backend: String,
    ) -> Self {
        let mut app = Self {
            should_quit: false,
            mode: AppMode::Normal,
            status: "Press ? for help. Enter to edit a cell, r to run it, q to quit.".into(),
            show_help: false,
            notebook,
            editor,
            bindings: KeyBindings::with_defaults(),
            completion: CompletionConfig::default(),
            bridge,
            backend,
            scroll: 0,
            reveal: None,
            pending_reveals: Vec::new(),
        };
        app.sync_editor();
        app
    }

    /// Replace the notebook with the one derived from `action`.
    pub fn dispatch(&mut self, action: NotebookAction) {
        let before = self.notebook.active();
        self.notebook = self.notebook.reduce(&action);
        if self.notebook.active() != before {
            self.sync_editor();
        }
    }

    /// Load the active cell into the editor, focus it and ask for it to be shown.
    fn sync_editor(&mut self) {
        let sql = self
            .notebook
            .active_cell()
            .map(|c| c.sql.clone())
            .unwrap_or_default();
        self.editor.set_text(&sql);
        self.editor.set_focused(self.mode == AppMode::Editing);
        self.reveal = self.notebook.active();
    }

    fn active_label(&self) -> usize {
        self.notebook.active_index().map(|i| i + 1).unwrap_or(0)
    }

    // Focus helpers
    pub fn select_next(&mut self) {
        let Some(i) = self.notebook.active_index() else {
            return;
        };
        if let Some(next) = self.notebook.cells().get(i + 1) {
            self.dispatch(NotebookAction::Select(next.id));
        }
    }

    pub fn select_prev(&mut self) {
        let Some(i) = self.notebook.active_index() else {
            return;
        };
        if i > 0 {
            let prev = self.notebook.cells()[i - 1].id;
            self.dispatch(NotebookAction::Select(prev));
        }
    }

    pub fn begin_edit(&mut self) {
        self.mode = AppMode::Editing;
        self.editor.set_focused(true);
        self.reveal = self.notebook.active();
        self.status = "Editing: Ctrl+R/F5 run, Esc clear result (again to leave), Tab complete".into();
    }

    pub fn end_edit(&mut self) {
        self.mode = AppMode::Normal;
        self.editor.set_focused(false);
        self.status = "Left editor".into();
    }

    pub fn toggle_help(&mut self) {
        self.show_help = !self.show_help;
    }

    pub fn add_cell(&mut self, position: Position) {
        self.mode = AppMode::Editing;
        self.dispatch(NotebookAction::Add(position));
        if let Some(id) = self.notebook.active() {
            tracing::info!(cell = %id, ?position, "cell added");
        }
        self.status = format!("Added cell {}", self.active_label());
    }

    pub fn delete_active_cell(&mut self) {
        if !self.notebook.can_delete() {
            self.status = "Cannot delete the only cell".into();
            return;
        }
        let Some(id) = self.notebook.active() else {
            return;
        };
        let label = self.active_label();
        if self.bridge.is_in_flight(id) {
            tracing::info!(cell = %id, "deleting running cell; its result will be discarded");
        }
        self.dispatch(NotebookAction::Delete(id));
        tracing::info!(cell = %id, "cell deleted");
        self.status = format!("Deleted cell {label}");
    }

    pub fn format_active_cell(&mut self) {
        let Some(cell) = self.notebook.active_cell() else {
            return;
        };
        let id = cell.id;
        let formatted = format_sql(&cell.sql);
        if formatted == cell.sql {
            self.status = "Already formatted".into();
            return;
        }
        self.editor.set_text(&formatted);
        self.dispatch(NotebookAction::UpdateSql { id, sql: formatted });
        self.status = "Formatted SQL".into();
    }

    pub fn run_active_cell(&mut self) {
        if let Some(id) = self.notebook.active() {
            self.run_cell(id);
        }
    }

    pub fn run_cell(&mut self, id: CellId) {
        let Some(cell) = self.notebook.get(id) else {
            return;
        };
        // The run control stays disabled until the previous request answers
        if cell.is_running() || self.bridge.is_in_flight(id) {
            self.status = "Cell is already running".into();
            return;
        }
        if !cell.has_runnable_sql() {
            return;
        }
        let sql = cell.sql.clone();
        let label = self.notebook.index_of(id).map(|i| i + 1).unwrap_or(0);

        self.dispatch(NotebookAction::BeginRun(id));
        match self.bridge.submit(id, sql) {
            Ok(()) => {
                tracing::info!(cell = %id, "run submitted");
                self.status = format!("Running cell {label}…");
            }
            Err(e) => {
                tracing::warn!(cell = %id, error = %e, "run could not be submitted");
                self.dispatch(NotebookAction::FinishRun {
                    id,
                    outcome: Err(e.to_string()),
                    elapsed: Duration::ZERO,
                });
                self.status = format!("Cell {label} failed: {e}");
            }
        }
    }

    pub fn clear_active_result(&mut self) {
        if let Some(id) = self.notebook.active() {
            self.dispatch(NotebookAction::ClearResult(id));
            self.status = "Result cleared".into();
        }
    }

    pub fn copy_active_result(&mut self) {
        let Some(cell) = self.notebook.active_cell().filter(|c| c.has_result()) else {
            self.status = "Nothing to copy (no result)".into();
            return;
        };
        self.status = match clipboard::copy_text(&cell.result, "result") {
            Ok(Copied::Clipboard(prog)) => format!("Copied result to clipboard via {prog}"),
            Ok(Copied::File(path)) => format!(
                "Wrote result to {} (no clipboard tool found)",
                path.display()
            ),
            Err(e) => format!("Failed to copy result: {e}"),
        };
    }

    /// Keys typed while the active cell's editor has focus.
    pub fn handle_editor_key(&mut self, key: KeyEvent) {
        match self.bindings.lookup(&key) {
            Some(EditorCommand::Run) => self.run_active_cell(),
            Some(EditorCommand::ClearResult) => {
                if self.notebook.active_cell().is_some_and(|c| c.has_result()) {
                    self.clear_active_result();
                } else {
                    self.end_edit();
                }
            }
            Some(EditorCommand::Complete) => self.complete_word(),
            Some(EditorCommand::Format) => self.format_active_cell(),
            None => {
                if let Some(sql) = self.editor.input(key) {
                    self.store_editor_text(sql);
                }
            }
        }
    }

    fn store_editor_text(&mut self, sql: String) {
        if let Some(id) = self.notebook.active() {
            self.dispatch(NotebookAction::UpdateSql { id, sql });
        }
    }

    fn complete_word(&mut self) {
        let prefix = self.editor.word_before_cursor();
        if prefix.is_empty() {
            let sql = self.editor.insert_str(INDENT);
            self.store_editor_text(sql);
            return;
        }
        let candidates = self.completion.suggestions(&prefix);
        let Some(first) = candidates.first() else {
            self.status = format!("No completions for '{prefix}'");
            return;
        };
        let sql = self.editor.replace_word_before_cursor(first);
        self.store_editor_text(sql);
        self.status = if candidates.len() > 1 {
            format!("Completed {first} (also: {})", candidates[1..].join(", "))
        } else {
            format!("Completed {first}")
        };
    }

    /// Fold finished runs into the notebook. Returns true when anything changed.
    pub fn apply_completions(&mut self) -> bool {
        let done = self.bridge.poll();
        let changed = !done.is_empty();
        for completion in done {
            let id = completion.cell;
            let Some(index) = self.notebook.index_of(id) else {
                tracing::debug!(cell = %id, "completion for deleted cell dropped");
                continue;
            };
            let elapsed_ms = completion.elapsed.as_millis();
            tracing::info!(
                cell = %id,
                elapsed_ms = elapsed_ms as u64,
                ok = completion.outcome.is_ok(),
                "run finished"
            );
            self.status = match &completion.outcome {
                Ok(_) => format!("Cell {} finished in {elapsed_ms} ms", index + 1),
                Err(e) => format!("Cell {} failed: {e}", index + 1),
            };
            if completion.outcome.is_ok() {
                self.pending_reveals.push((id, Instant::now() + REVEAL_DELAY));
            }
            self.dispatch(NotebookAction::FinishRun {
                id,
                outcome: completion.outcome,
                elapsed: completion.elapsed,
            });
        }
        changed
    }

    /// Fire delayed reveals that are due. Returns true when one fired.
    pub fn on_tick(&mut self, now: Instant) -> bool {
        let (due, waiting): (Vec<_>, Vec<_>) = self
            .pending_reveals
            .drain(..)
            .partition(|(_, at)| *at <= now);
        self.pending_reveals = waiting;
        match due.last() {
            Some((id, _)) if self.notebook.get(*id).is_some() => {
                self.reveal = Some(*id);
                true
            }
            _ => false,
        }
    }

    pub fn running_count(&self) -> usize {
        self.bridge.in_flight_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cells::CellStatus;
    use crate::db::{ExecRequest, ExecResponse};
    use crate::editor::TextAreaEditor;
    use crossbeam_channel::{Receiver, Sender};
    use crossterm::event::{KeyCode, KeyModifiers};
    use pretty_assertions::assert_eq;

    struct Harness {
        app: App,
        req_rx: Receiver<ExecRequest>,
        resp_tx: Sender<ExecResponse>,
    }

    fn harness(seeds: &[&str]) -> Harness {
        let (req_tx, req_rx) = crossbeam_channel::unbounded();
        let (resp_tx, resp_rx) = crossbeam_channel::unbounded();
        let app = App::new(
            Notebook::seeded(seeds.iter().copied()),
            Box::new(TextAreaEditor::new()),
            ExecutionBridge::new(req_tx, resp_rx),
            "test".into(),
        );
        Harness {
            app,
            req_rx,
            resp_tx,
        }
    }

    fn press(app: &mut App, code: KeyCode) {
        app.handle_editor_key(KeyEvent::new(code, KeyModifiers::NONE));
    }

    fn type_str(app: &mut App, text: &str) {
        for c in text.chars() {
            press(app, KeyCode::Char(c));
        }
    }

    fn answer(h: &Harness, outcome: Result<&str, &str>) {
        let ExecRequest::Execute { cell, .. } = h.req_rx.try_recv().expect("request sent");
        h.resp_tx
            .send(ExecResponse::Finished {
                cell,
                outcome: outcome.map(str::to_string).map_err(str::to_string),
                finished_at: Instant::now(),
            })
            .unwrap();
    }

    #[test]
    fn typing_updates_active_cell_sql() {
        let mut h = harness(&[""]);
        h.app.begin_edit();
        type_str(&mut h.app, "SELECT 1");
        assert_eq!(h.app.notebook.active_cell().unwrap().sql, "SELECT 1");
        assert!(h.app.editor.is_focused());
    }

    #[test]
    fn successful_run_stores_result_and_schedules_reveal() {
        let mut h = harness(&["SELECT 1 AS x"]);
        h.app.run_active_cell();
        let id = h.app.notebook.active().unwrap();
        assert_eq!(h.app.notebook.get(id).unwrap().status, CellStatus::Running);

        answer(&h, Ok(r#"[{"x":1}]"#));
        h.app.reveal = None;
        assert!(h.app.apply_completions());

        let cell = h.app.notebook.get(id).unwrap();
        assert_eq!(cell.status, CellStatus::Success);
        assert_eq!(cell.result, r#"[{"x":1}]"#);
        assert!(cell.execution_time.is_some());

        assert!(!h.app.on_tick(Instant::now()));
        assert!(h.app.on_tick(Instant::now() + REVEAL_DELAY * 2));
        assert_eq!(h.app.reveal, Some(id));
    }

    #[test]
    fn failed_run_is_prefixed() {
        let mut h = harness(&["SELECT nope"]);
        h.app.run_active_cell();
        answer(&h, Err("no such column: nope"));
        h.app.apply_completions();

        let cell = h.app.notebook.active_cell().unwrap();
        assert_eq!(cell.status, CellStatus::Error);
        assert_eq!(cell.result, "Error: no such column: nope");
        assert!(h.app.status.contains("failed"));
    }

    #[test]
    fn blank_cell_run_is_ignored() {
        let mut h = harness(&["  \n "]);
        let before = h.app.notebook.clone();
        h.app.run_active_cell();
        assert!(h.req_rx.try_recv().is_err());
        assert_eq!(h.app.notebook, before);
    }

    #[test]
    fn run_is_refused_while_in_flight() {
        let mut h = harness(&["SELECT 1"]);
        h.app.run_active_cell();
        h.app.run_active_cell();
        assert!(h.req_rx.try_recv().is_ok());
        assert!(h.req_rx.try_recv().is_err());
        assert_eq!(h.app.status, "Cell is already running");
        assert_eq!(h.app.running_count(), 1);
    }

    #[test]
    fn cleared_running_cell_ignores_late_answer_and_stays_locked() {
        let mut h = harness(&["SELECT 1"]);
        h.app.run_active_cell();
        h.app.clear_active_result();
        // still in flight, so a re-run is refused
        h.app.run_active_cell();
        assert_eq!(h.app.status, "Cell is already running");

        answer(&h, Ok("[]"));
        h.app.apply_completions();
        let cell = h.app.notebook.active_cell().unwrap();
        assert_eq!(cell.status, CellStatus::Idle);
        assert_eq!(cell.result, "");
    }

    #[test]
    fn answer_for_deleted_cell_is_dropped() {
        let mut h = harness(&["SELECT 1", "SELECT 2"]);
        h.app.select_next();
        h.app.run_active_cell();
        h.app.delete_active_cell();
        answer(&h, Ok("[]"));
        let before = h.app.notebook.clone();
        h.app.apply_completions();
        assert_eq!(h.app.notebook, before);
        assert_eq!(h.app.running_count(), 0);
    }

    #[test]
    fn worker_gone_surfaces_as_error() {
        let mut h = harness(&["SELECT 1"]);
        let Harness { app, req_rx, .. } = &mut h;
        drop(std::mem::replace(req_rx, crossbeam_channel::never()));
        app.run_active_cell();
        let cell = app.notebook.active_cell().unwrap();
        assert_eq!(cell.status, CellStatus::Error);
        assert_eq!(cell.result, "Error: execution worker is not running");
    }

    #[test]
    fn escape_clears_then_leaves_editor() {
        let mut h = harness(&["SELECT 1"]);
        h.app.begin_edit();
        h.app.run_active_cell();
        answer(&h, Ok("[]"));
        h.app.apply_completions();

        press(&mut h.app, KeyCode::Esc);
        assert_eq!(h.app.mode, AppMode::Editing);
        assert_eq!(h.app.notebook.active_cell().unwrap().status, CellStatus::Idle);

        press(&mut h.app, KeyCode::Esc);
        assert_eq!(h.app.mode, AppMode::Normal);
        assert!(!h.app.editor.is_focused());
    }

    #[test]
    fn adding_and_deleting_moves_editor_between_cells() {
        let mut h = harness(&["SELECT 1"]);
        h.app.add_cell(Position::Below);
        assert_eq!(h.app.mode, AppMode::Editing);
        assert_eq!(h.app.notebook.len(), 2);
        assert_eq!(h.app.notebook.active_index(), Some(1));
        assert_eq!(h.app.editor.text(), "");

        h.app.delete_active_cell();
        assert_eq!(h.app.notebook.active_index(), Some(0));
        assert_eq!(h.app.editor.text(), "SELECT 1");

        h.app.delete_active_cell();
        assert_eq!(h.app.notebook.len(), 1);
        assert_eq!(h.app.status, "Cannot delete the only cell");
    }

    #[test]
    fn selection_follows_arrows_and_requests_reveal() {
        let mut h = harness(&["a", "b", "c"]);
        h.app.select_next();
        h.app.select_next();
        h.app.select_next();
        assert_eq!(h.app.notebook.active_index(), Some(2));
        assert_eq!(h.app.editor.text(), "c");
        assert_eq!(h.app.reveal, h.app.notebook.active());
        h.app.select_prev();
        assert_eq!(h.app.editor.text(), "b");
    }

    #[test]
    fn tab_completes_keyword() {
        let mut h = harness(&[""]);
        h.app.begin_edit();
        type_str(&mut h.app, "sel");
        press(&mut h.app, KeyCode::Tab);
        assert_eq!(h.app.notebook.active_cell().unwrap().sql, "SELECT");
        assert_eq!(h.app.status, "Completed SELECT");
    }

    #[test]
    fn tab_without_word_indents() {
        let mut h = harness(&[""]);
        h.app.begin_edit();
        press(&mut h.app, KeyCode::Tab);
        assert_eq!(h.app.notebook.active_cell().unwrap().sql, INDENT);
    }

    #[test]
    fn format_updates_cell_and_editor() {
        let mut h = harness(&["select * from t where x = 1"]);
        h.app.format_active_cell();
        let expected = "select *\nfrom t\nwhere x = 1";
        assert_eq!(h.app.notebook.active_cell().unwrap().sql, expected);
        assert_eq!(h.app.editor.text(), expected);
        h.app.format_active_cell();
        assert_eq!(h.app.status, "Already formatted");
    }

    #[test]
    fn copy_without_result_only_sets_status() {
        let mut h = harness(&["SELECT 1"]);
        h.app.copy_active_result();
        assert_eq!(h.app.status, "Nothing to copy (no result)");
    }
}
