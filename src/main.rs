use std::io;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;
use crossterm::{
    event::{
        self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
    },
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{backend::CrosstermBackend, prelude::*};

mod app;
mod bridge;
mod cells;
mod clipboard;
mod db;
mod editor;
mod logging;
mod result_view;
mod sql_format;
mod ui;

use app::{App, AppMode};
use bridge::ExecutionBridge;
use cells::{Notebook, Position};
use db::{DemoExecutor, SqlExecutor, SqliteExecutor};
use editor::TextAreaEditor;

#[derive(Parser, Debug)]
#[command(author, version, about = "Notebook-style SQL editor for the terminal")]
struct Args {
    /// Path to SQLite database file (in-memory when omitted)
    #[arg(value_name = "DB_PATH")]
    db_path: Option<String>,

    /// Use canned demo responses instead of a database
    #[arg(long)]
    demo: bool,

    /// Row cap for statements that return rows
    #[arg(short = 'n', long, default_value_t = 1000)]
    max_rows: usize,

    /// Write logs here (RUST_LOG alone logs to the temp dir)
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Seed a cell with this SQL; repeatable
    #[arg(long = "sql", value_name = "TEXT")]
    sql: Vec<String>,
}

impl Args {
    fn seeds(&self) -> Vec<String> {
        if !self.sql.is_empty() {
            return self.sql.clone();
        }
        let sample = if self.demo {
            "SELECT * FROM users;"
        } else {
            "SELECT sqlite_version();"
        };
        vec![sample.to_string()]
    }
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<io::Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend)?;
    Ok(terminal)
}

fn restore_terminal(mut terminal: Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(args.log_file.as_deref())?;

    let executor: Box<dyn SqlExecutor> = if args.demo {
        Box::new(DemoExecutor)
    } else {
        Box::new(SqliteExecutor::open(args.db_path.as_deref(), args.max_rows)?)
    };
    let backend = executor.describe();
    tracing::info!(%backend, max_rows = args.max_rows, "starting");

    let bridge = ExecutionBridge::spawn(executor);
    let notebook = Notebook::seeded(args.seeds());
    let mut app = App::new(notebook, Box::new(TextAreaEditor::new()), bridge, backend);

    let mut terminal = setup_terminal()?;

    let mut last_tick = Instant::now();
    let tick_rate = Duration::from_millis(100);

    let res = run_app(&mut terminal, &mut app, tick_rate, &mut last_tick);

    restore_terminal(terminal)?;
    if let Err(e) = res {
        tracing::error!(error = ?e, "exited with error");
        eprintln!("Error: {e:?}");
    }
    Ok(())
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    tick_rate: Duration,
    last_tick: &mut Instant,
) -> Result<()> {
    // Redraw only when state changes or on tick
    let mut dirty = true;
    loop {
        if app.apply_completions() {
            dirty = true;
        }
        if app.on_tick(Instant::now()) {
            dirty = true;
        }

        let tick_due = last_tick.elapsed() >= tick_rate;
        if dirty || tick_due {
            terminal.draw(|f| ui::draw(f, app))?;
            dirty = false;
            if tick_due {
                *last_tick = Instant::now();
            }
        }

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or(Duration::from_secs(0));

        if crossterm::event::poll(timeout)?
            && let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
        {
            handle_key(app, key);
            dirty = true;
        }

        if app.should_quit {
            return Ok(());
        }
    }
}

fn handle_key(app: &mut App, key: KeyEvent) {
    if app.show_help {
        if matches!(key.code, KeyCode::Char('?') | KeyCode::Esc | KeyCode::Char('q')) {
            app.toggle_help();
        }
        return;
    }
    match app.mode {
        AppMode::Normal => handle_key_normal(app, key),
        AppMode::Editing => app.handle_editor_key(key),
    }
}

fn handle_key_normal(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,
        KeyCode::Char('?') => app.toggle_help(),
        KeyCode::Down | KeyCode::Char('j') => app.select_next(),
        KeyCode::Up | KeyCode::Char('k') => app.select_prev(),
        KeyCode::Enter | KeyCode::Char('i') => app.begin_edit(),
        KeyCode::Char('a') => app.add_cell(Position::Below),
        KeyCode::Char('A') => app.add_cell(Position::Above),
        KeyCode::Char('d') => app.delete_active_cell(),
        KeyCode::Char('f') => app.format_active_cell(),
        KeyCode::Char('r') | KeyCode::F(5) => app.run_active_cell(),
        KeyCode::Char('c') => app.clear_active_result(),
        KeyCode::Char('y') => app.copy_active_result(),
        _ => {}
    }
}
