use std::fmt;
use std::time::Duration;

/// Editor rows a freshly created cell asks for.
pub const DEFAULT_CELL_HEIGHT: u16 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellId(u64);

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellStatus {
    Idle,
    Running,
    Success,
    Error,
}

impl CellStatus {
    pub fn label(self) -> &'static str {
        match self {
            CellStatus::Idle => "idle",
            CellStatus::Running => "running",
            CellStatus::Success => "success",
            CellStatus::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub id: CellId,
    pub sql: String,
    /// Raw text of the last run; empty when never run or cleared
    pub result: String,
    pub status: CellStatus,
    pub execution_time: Option<Duration>,
    /// Editor rows requested at creation
    pub height: Option<u16>,
}

impl Cell {
    fn new(id: CellId, sql: String) -> Self {
        Self {
            id,
            sql,
            result: String::new(),
            status: CellStatus::Idle,
            execution_time: None,
            height: Some(DEFAULT_CELL_HEIGHT),
        }
    }

    pub fn has_result(&self) -> bool {
        !self.result.is_empty()
    }

    pub fn is_running(&self) -> bool {
        self.status == CellStatus::Running
    }

    /// Blank or whitespace-only SQL never leaves idle.
    pub fn has_runnable_sql(&self) -> bool {
        !self.sql.trim().is_empty()
    }

    fn cleared(&self) -> Self {
        Self {
            result: String::new(),
            status: CellStatus::Idle,
            execution_time: None,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    Above,
    Below,
}

/// Returned text on success, failure message otherwise.
pub type RunOutcome = Result<String, String>;

#[derive(Debug, Clone, PartialEq)]
pub enum NotebookAction {
    Add(Position),
    Delete(CellId),
    UpdateSql { id: CellId, sql: String },
    ClearResult(CellId),
    Select(CellId),
    BeginRun(CellId),
    FinishRun {
        id: CellId,
        outcome: RunOutcome,
        elapsed: Duration,
    },
}

/// Ordered cells plus the active-cell selector.
///
/// Every operation derives a new notebook from `&self`; nothing mutates a
/// shared sequence in place, so a snapshot held elsewhere stays consistent.
#[derive(Debug, Clone, PartialEq)]
pub struct Notebook {
    cells: Vec<Cell>,
    active: Option<CellId>,
    next_id: u64,
}

impl Default for Notebook {
    fn default() -> Self {
        Self::seeded(std::iter::empty::<String>())
    }
}

impl Notebook {
    /// One cell per seed; an empty seed list still yields a single blank cell.
    pub fn seeded<I, S>(seeds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut cells: Vec<Cell> = seeds
            .into_iter()
            .enumerate()
            .map(|(i, sql)| Cell::new(CellId(i as u64), sql.into()))
            .collect();
        if cells.is_empty() {
            cells.push(Cell::new(CellId(0), String::new()));
        }
        let next_id = cells.len() as u64;
        let active = cells.first().map(|c| c.id);
        Self {
            cells,
            active,
            next_id,
        }
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn active(&self) -> Option<CellId> {
        self.active
    }

    pub fn active_cell(&self) -> Option<&Cell> {
        self.active.and_then(|id| self.get(id))
    }

    pub fn active_index(&self) -> Option<usize> {
        self.active.and_then(|id| self.index_of(id))
    }

    pub fn get(&self, id: CellId) -> Option<&Cell> {
        self.cells.iter().find(|c| c.id == id)
    }

    pub fn index_of(&self, id: CellId) -> Option<usize> {
        self.cells.iter().position(|c| c.id == id)
    }

    pub fn can_delete(&self) -> bool {
        self.cells.len() > 1
    }

    pub fn reduce(&self, action: &NotebookAction) -> Self {
        match action {
            NotebookAction::Add(position) => self.add_cell(*position),
            NotebookAction::Delete(id) => self.delete_cell(*id),
            NotebookAction::UpdateSql { id, sql } => self.update_sql(*id, sql),
            NotebookAction::ClearResult(id) => self.clear_result(*id),
            NotebookAction::Select(id) => self.select(*id),
            NotebookAction::BeginRun(id) => self.begin_run(*id),
            NotebookAction::FinishRun {
                id,
                outcome,
                elapsed,
            } => self.finish_run(*id, outcome.clone(), *elapsed),
        }
    }

    pub fn add_cell(&self, position: Position) -> Self {
        let id = CellId(self.next_id);
        let index = match (self.active_index(), position) {
            (Some(i), Position::Above) => i,
            (Some(i), Position::Below) => i + 1,
            (None, _) => self.cells.len(),
        };

        let mut cells = Vec::with_capacity(self.cells.len() + 1);
        cells.extend_from_slice(&self.cells[..index]);
        cells.push(Cell::new(id, String::new()));
        cells.extend_from_slice(&self.cells[index..]);

        Self {
            cells,
            active: Some(id),
            next_id: self.next_id + 1,
        }
    }

    pub fn delete_cell(&self, id: CellId) -> Self {
        if !self.can_delete() {
            return self.clone();
        }
        let Some(index) = self.index_of(id) else {
            return self.clone();
        };

        let cells: Vec<Cell> = self.cells.iter().filter(|c| c.id != id).cloned().collect();
        let active = if index > 0 {
            cells.get(index - 1)
        } else {
            cells.first()
        }
        .map(|c| c.id);

        Self {
            cells,
            active,
            next_id: self.next_id,
        }
    }

    pub fn update_sql(&self, id: CellId, sql: &str) -> Self {
        self.map_cell(id, |cell| Cell {
            sql: sql.to_string(),
            ..cell.clone()
        })
    }

    pub fn clear_result(&self, id: CellId) -> Self {
        self.map_cell(id, Cell::cleared)
    }

    pub fn select(&self, id: CellId) -> Self {
        if self.get(id).is_none() {
            return self.clone();
        }
        Self {
            active: Some(id),
            ..self.clone()
        }
    }

    /// Enter `Running`, dropping the previous result. Ignored for blank SQL.
    pub fn begin_run(&self, id: CellId) -> Self {
        self.map_cell(id, |cell| {
            if !cell.has_runnable_sql() {
                return cell.clone();
            }
            Cell {
                status: CellStatus::Running,
                ..cell.cleared()
            }
        })
    }

    /// Only a running cell accepts a completion; one cleared or deleted
    /// meanwhile keeps its current state.
    pub fn finish_run(&self, id: CellId, outcome: RunOutcome, elapsed: Duration) -> Self {
        self.map_cell(id, |cell| {
            if !cell.is_running() {
                return cell.clone();
            }
            let (status, result) = match &outcome {
                Ok(text) => (CellStatus::Success, text.clone()),
                Err(message) => (CellStatus::Error, format!("Error: {message}")),
            };
            Cell {
                status,
                result,
                execution_time: Some(elapsed),
                ..cell.clone()
            }
        })
    }

    fn map_cell(&self, id: CellId, f: impl Fn(&Cell) -> Cell) -> Self {
        Self {
            cells: self
                .cells
                .iter()
                .map(|c| if c.id == id { f(c) } else { c.clone() })
                .collect(),
            ..self.clone()
        }
    }
}
