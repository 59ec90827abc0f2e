use crate::app::{App, AppMode};
use crate::cells::{Cell, CellStatus, DEFAULT_CELL_HEIGHT};
use crate::editor::{CompletionConfig, is_word_char};
use crate::result_view::{MessageKind, ResultTable, ResultView, TableValue};
use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{
        Block, Borders, Cell as TableCell, Clear, Paragraph, Row, Table, Wrap, block::Title,
    },
};

/// Editor rows never grow past this, however long the SQL.
const MAX_EDITOR_ROWS: u16 = 20;
/// Result panel content rows before it starts cutting off.
const MAX_RESULT_ROWS: u16 = 14;

pub fn draw(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(2)].as_ref())
        .split(f.size());

    draw_notebook(f, chunks[0], app);
    draw_status(f, chunks[1], app);

    if app.show_help {
        draw_help(f, f.size());
    }
}

fn draw_notebook(f: &mut Frame, area: Rect, app: &mut App) {
    let views: Vec<Option<ResultView>> = app
        .notebook
        .cells()
        .iter()
        .map(|c| c.has_result().then(|| ResultView::parse(&c.result)))
        .collect();
    let heights: Vec<u16> = app
        .notebook
        .cells()
        .iter()
        .zip(&views)
        .map(|(c, v)| cell_height(c, v.as_ref()))
        .collect();

    if let Some(id) = app.reveal.take()
        && let Some(target) = app.notebook.index_of(id)
    {
        app.scroll = fit_scroll(&heights, app.scroll, target, area.height);
    }
    app.scroll = app.scroll.min(heights.len().saturating_sub(1));

    let app: &App = app;
    let mut y = area.y;
    for (i, cell) in app.notebook.cells().iter().enumerate().skip(app.scroll) {
        if y >= area.bottom() {
            break;
        }
        let h = heights[i].min(area.bottom() - y);
        let rect = Rect::new(area.x, y, area.width, h);
        draw_cell(f, rect, app, i, cell, views[i].as_ref());
        y += h;
    }
}

fn editor_rows(cell: &Cell) -> u16 {
    let hint = cell.height.unwrap_or(DEFAULT_CELL_HEIGHT);
    let lines = cell.sql.split('\n').count() as u16;
    hint.max(lines).min(MAX_EDITOR_ROWS)
}

fn result_rows(cell: &Cell, view: Option<&ResultView>) -> u16 {
    match view {
        // one row for the panel's top rule
        Some(v) => 1 + (v.content_height() as u16).min(MAX_RESULT_ROWS),
        None if cell.is_running() => 2,
        None => 0,
    }
}

/// Full height of a cell including its borders.
pub fn cell_height(cell: &Cell, view: Option<&ResultView>) -> u16 {
    2 + editor_rows(cell) + result_rows(cell, view)
}

/// Smallest change to `scroll` that shows cell `target` whole, or at least
/// from its top when it is taller than the viewport.
pub fn fit_scroll(heights: &[u16], scroll: usize, target: usize, viewport: u16) -> usize {
    if target < scroll {
        return target;
    }
    let mut scroll = scroll;
    while scroll < target
        && heights[scroll..=target]
            .iter()
            .map(|h| u32::from(*h))
            .sum::<u32>()
            > u32::from(viewport)
    {
        scroll += 1;
    }
    scroll
}

fn draw_cell(
    f: &mut Frame,
    area: Rect,
    app: &App,
    index: usize,
    cell: &Cell,
    view: Option<&ResultView>,
) {
    let active = app.notebook.active() == Some(cell.id);
    let border_style = match (active, app.mode) {
        (true, AppMode::Editing) => Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD),
        (true, AppMode::Normal) => Style::default().fg(Color::Yellow),
        (false, _) => Style::default().fg(Color::DarkGray),
    };

    let mut title = vec![Span::raw(format!(" [{}] ", index + 1)), status_badge(cell.status)];
    if let Some(t) = cell.execution_time {
        title.push(Span::styled(
            format!(" {} ms", t.as_millis()),
            Style::default().fg(Color::DarkGray),
        ));
    }
    title.push(Span::raw(" "));

    let mut block = Block::default()
        .borders(Borders::ALL)
        .border_style(border_style)
        .title(Line::from(title));
    if active {
        block = block.title(
            Title::from(controls_line(app.notebook.can_delete(), cell.is_running()))
                .alignment(Alignment::Right),
        );
    }
    let inner = block.inner(area);
    f.render_widget(block, area);

    let parts = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(editor_rows(cell)), Constraint::Min(0)].as_ref())
        .split(inner);

    if active {
        app.editor.render(f, parts[0]);
    } else {
        f.render_widget(
            Paragraph::new(highlight_sql(&cell.sql, &app.completion)),
            parts[0],
        );
    }

    if parts[1].height > 0 && result_rows(cell, view) > 0 {
        draw_result(f, parts[1], cell, view);
    }
}

/// Header controls; the ones that would be refused are dimmed.
fn controls_line(can_delete: bool, running: bool) -> Line<'static> {
    let on = Style::default().fg(Color::Gray);
    let off = Style::default()
        .fg(Color::DarkGray)
        .add_modifier(Modifier::CROSSED_OUT);
    Line::from(vec![
        Span::styled(" A/a add", on),
        Span::raw(" · "),
        Span::styled("f format", on),
        Span::raw(" · "),
        Span::styled("r run", if running { off } else { on }),
        Span::raw(" · "),
        Span::styled("c clear", on),
        Span::raw(" · "),
        Span::styled("y copy", on),
        Span::raw(" · "),
        Span::styled("d delete ", if can_delete { on } else { off }),
    ])
}

fn status_badge(status: CellStatus) -> Span<'static> {
    let (glyph, color) = match status {
        CellStatus::Idle => ("○", Color::Gray),
        CellStatus::Running => ("◌", Color::Yellow),
        CellStatus::Success => ("●", Color::Green),
        CellStatus::Error => ("✗", Color::Red),
    };
    Span::styled(
        format!("{glyph} {}", status.label()),
        Style::default().fg(color).add_modifier(Modifier::BOLD),
    )
}

fn draw_result(f: &mut Frame, area: Rect, cell: &Cell, view: Option<&ResultView>) {
    let rule_style = match cell.status {
        CellStatus::Error => Style::default().fg(Color::Red),
        _ => Style::default().fg(Color::DarkGray),
    };
    let block = Block::default()
        .borders(Borders::TOP)
        .border_style(rule_style)
        .title(" Result ");
    let inner = block.inner(area);
    f.render_widget(block, area);

    let Some(view) = view else {
        let p = Paragraph::new("Running…")
            .style(Style::default().fg(Color::Yellow).add_modifier(Modifier::ITALIC));
        f.render_widget(p, inner);
        return;
    };

    match view {
        ResultView::Raw(text) => {
            let style = if cell.status == CellStatus::Error {
                Style::default().fg(Color::Red)
            } else {
                Style::default()
            };
            f.render_widget(Paragraph::new(text.as_str()).style(style), inner);
        }
        ResultView::Message { kind, body } => {
            let (label, color) = match kind {
                MessageKind::Error => (" Error ", Color::Red),
                MessageKind::Info => (" Message ", Color::Cyan),
            };
            let boxed = Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(color))
                .title(Span::styled(label, Style::default().fg(color).add_modifier(Modifier::BOLD)));
            let p = Paragraph::new(body.as_str())
                .block(boxed)
                .wrap(Wrap { trim: false });
            f.render_widget(p, inner);
        }
        ResultView::NoRows => {
            let p = Paragraph::new(ResultView::NO_ROWS_NOTICE).style(
                Style::default()
                    .fg(Color::DarkGray)
                    .add_modifier(Modifier::ITALIC),
            );
            f.render_widget(p, inner);
        }
        ResultView::Table(table) => draw_table(f, inner, table),
        ResultView::Json(text) => {
            f.render_widget(Paragraph::new(text.as_str()), inner);
        }
    }
}

fn draw_table(f: &mut Frame, area: Rect, table: &ResultTable) {
    let parts = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(1)].as_ref())
        .split(area);

    let widths = column_widths(area.width, table.column_count());
    let header = Row::new(table.headers.iter().map(|c| TableCell::from(c.as_str()))).style(
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD),
    );

    let rows: Vec<Row> = table
        .rows
        .iter()
        .map(|row| {
            Row::new(row.iter().map(|val| match val {
                TableValue::Null => TableCell::from(Span::styled(
                    val.as_text(),
                    Style::default()
                        .fg(Color::DarkGray)
                        .add_modifier(Modifier::ITALIC),
                )),
                _ => TableCell::from(val.as_text()),
            }))
        })
        .collect();

    let t = Table::new(rows, widths).header(header).column_spacing(1);
    f.render_widget(t, parts[0]);

    let footer = Paragraph::new(table.footer()).style(Style::default().fg(Color::DarkGray));
    f.render_widget(footer, parts[1]);
}

fn column_widths(total_width: u16, cols: usize) -> Vec<Constraint> {
    if cols == 0 {
        return vec![];
    }
    // Evenly divide; spacing between columns comes off the top
    let w = total_width.saturating_sub(cols as u16 - 1);
    let per = (w / cols as u16).max(1);
    (0..cols).map(|_| Constraint::Length(per)).collect()
}

/// Keyword coloring for cells that are not being edited. A word match, not a lexer.
pub fn highlight_sql(sql: &str, cfg: &CompletionConfig) -> Vec<Line<'static>> {
    let keyword = Style::default()
        .fg(Color::Cyan)
        .add_modifier(Modifier::BOLD);
    let function = Style::default().fg(Color::Magenta);

    sql.split('\n')
        .map(|line| {
            let mut spans: Vec<Span<'static>> = Vec::new();
            let mut word = String::new();
            let mut other = String::new();
            let flush_word = |word: &mut String, spans: &mut Vec<Span<'static>>| {
                if word.is_empty() {
                    return;
                }
                let w = std::mem::take(word);
                let style = if cfg.is_keyword(&w) {
                    keyword
                } else if cfg.is_function(&w) {
                    function
                } else {
                    Style::default()
                };
                spans.push(Span::styled(w, style));
            };
            for ch in line.chars() {
                if is_word_char(ch) {
                    if !other.is_empty() {
                        spans.push(Span::raw(std::mem::take(&mut other)));
                    }
                    word.push(ch);
                } else {
                    flush_word(&mut word, &mut spans);
                    other.push(ch);
                }
            }
            flush_word(&mut word, &mut spans);
            if !other.is_empty() {
                spans.push(Span::raw(other));
            }
            Line::from(spans)
        })
        .collect()
}

fn draw_status(f: &mut Frame, area: Rect, app: &App) {
    let mode = match app.mode {
        AppMode::Normal => "NORMAL",
        AppMode::Editing => "EDIT",
    };
    let mut spans = vec![
        Span::styled(
            format!("[{mode}] "),
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(app.status.as_str()),
        Span::styled(
            format!(
                "  | {} cells · {}",
                app.notebook.len(),
                app.backend
            ),
            Style::default().fg(Color::DarkGray),
        ),
    ];
    let running = app.running_count();
    if running > 0 {
        spans.push(Span::styled(
            format!(" · {running} running"),
            Style::default().fg(Color::Yellow),
        ));
    }
    let p = Paragraph::new(Line::from(spans)).block(Block::default().borders(Borders::TOP));
    f.render_widget(p, area);
}

const HELP: &[(&str, &str)] = &[
    ("j/k, ↑/↓", "select cell"),
    ("Enter, i", "edit selected cell"),
    ("a / A", "add cell below / above"),
    ("d", "delete cell"),
    ("f, Ctrl+F", "format SQL"),
    ("r, F5, Ctrl+R", "run cell"),
    ("c", "clear result"),
    ("y", "copy result"),
    ("Esc (editing)", "clear result, again to leave editor"),
    ("Tab (editing)", "complete keyword / name"),
    ("?", "toggle this help"),
    ("q", "quit"),
];

fn draw_help(f: &mut Frame, area: Rect) {
    let popup = centered_rect(60, 60, area);
    let lines: Vec<Line> = HELP
        .iter()
        .map(|(keys, what)| {
            Line::from(vec![
                Span::styled(
                    format!("{keys:<16}"),
                    Style::default()
                        .fg(Color::Yellow)
                        .add_modifier(Modifier::BOLD),
                ),
                Span::raw(*what),
            ])
        })
        .collect();
    let p = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(" Keys "));
    f.render_widget(Clear, popup);
    f.render_widget(p, popup);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::ExecutionBridge;
    use crate::cells::{Notebook, NotebookAction};
    use crate::editor::TextAreaEditor;
    use ratatui::{Terminal, backend::TestBackend, buffer::Buffer};
    use std::time::Duration;

    fn app_with(seeds: &[&str]) -> App {
        let (req_tx, _req_rx) = crossbeam_channel::unbounded();
        let (_resp_tx, resp_rx) = crossbeam_channel::unbounded();
        App::new(
            Notebook::seeded(seeds.iter().copied()),
            Box::new(TextAreaEditor::new()),
            ExecutionBridge::new(req_tx, resp_rx),
            "test".into(),
        )
    }

    fn finish(app: &mut App, index: usize, outcome: Result<&str, &str>) {
        let id = app.notebook.cells()[index].id;
        app.dispatch(NotebookAction::BeginRun(id));
        app.dispatch(NotebookAction::FinishRun {
            id,
            outcome: outcome.map(str::to_string).map_err(str::to_string),
            elapsed: Duration::from_millis(12),
        });
    }

    fn screen(app: &mut App, width: u16, height: u16) -> String {
        let mut terminal = Terminal::new(TestBackend::new(width, height)).unwrap();
        terminal.draw(|f| draw(f, app)).unwrap();
        buffer_text(terminal.backend().buffer())
    }

    fn buffer_text(buf: &Buffer) -> String {
        buf.content
            .chunks(buf.area.width as usize)
            .map(|row| row.iter().map(|c| c.symbol()).collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn fit_scroll_moves_up_to_target() {
        assert_eq!(fit_scroll(&[5, 5, 5], 2, 0, 10), 0);
    }

    #[test]
    fn fit_scroll_moves_down_until_target_fits() {
        let heights = [8, 8, 8, 8];
        assert_eq!(fit_scroll(&heights, 0, 1, 20), 0);
        assert_eq!(fit_scroll(&heights, 0, 3, 20), 2);
        // taller than the viewport: show its top
        assert_eq!(fit_scroll(&[4, 30], 0, 1, 20), 1);
    }

    #[test]
    fn cell_height_accounts_for_result_panel() {
        let nb = Notebook::seeded(["SELECT 1"]);
        let cell = &nb.cells()[0];
        assert_eq!(cell_height(cell, None), 2 + DEFAULT_CELL_HEIGHT);

        let view = ResultView::parse("[]");
        assert_eq!(cell_height(cell, Some(&view)), 2 + DEFAULT_CELL_HEIGHT + 2);

        let running = nb.begin_run(cell.id);
        assert_eq!(cell_height(&running.cells()[0], None), 2 + DEFAULT_CELL_HEIGHT + 2);
    }

    #[test]
    fn highlight_marks_keywords_and_functions() {
        let cfg = CompletionConfig::default();
        let lines = highlight_sql("select count(id) from users", &cfg);
        assert_eq!(lines.len(), 1);
        let spans = &lines[0].spans;
        let text: String = spans.iter().map(|s| s.content.as_ref()).collect();
        assert_eq!(text, "select count(id) from users");
        assert_eq!(spans[0].content, "select");
        assert_eq!(spans[0].style.fg, Some(Color::Cyan));
        assert_eq!(spans[2].content, "count");
        assert_eq!(spans[2].style.fg, Some(Color::Magenta));
        assert_eq!(spans[4].content, "id");
        assert_eq!(spans[4].style.fg, None);
    }

    #[test]
    fn renders_table_with_null_marker_and_footer() {
        let mut app = app_with(&["SELECT 1 AS a, NULL AS b"]);
        finish(&mut app, 0, Ok(r#"[{"a":1,"b":null}]"#));
        let text = screen(&mut app, 80, 24);
        assert!(text.contains("NULL"));
        assert!(text.contains("1 row · 2 columns"));
        assert!(text.contains("● success"));
        assert!(text.contains("12 ms"));
    }

    #[test]
    fn renders_no_rows_error_box_and_raw_error() {
        let mut app = app_with(&["a", "b", "c"]);
        finish(&mut app, 0, Ok("[]"));
        finish(&mut app, 1, Ok(r#"{"error":"bad"}"#));
        finish(&mut app, 2, Err("disk I/O error"));
        let text = screen(&mut app, 80, 60);
        assert!(text.contains(ResultView::NO_ROWS_NOTICE));
        assert!(text.contains(" Error "));
        assert!(text.contains("\"error\": \"bad\""));
        assert!(text.contains("Error: disk I/O error"));
    }

    #[test]
    fn reveal_scrolls_active_cell_into_view() {
        let seeds = ["1", "2", "3", "4", "5", "6"];
        let mut app = app_with(&seeds);
        for _ in 0..5 {
            app.select_next();
        }
        let text = screen(&mut app, 100, 20);
        assert!(app.scroll > 0);
        assert!(text.contains("[6]"));
        assert!(app.reveal.is_none());
    }

    #[test]
    fn help_overlay_lists_keys() {
        let mut app = app_with(&["x"]);
        app.toggle_help();
        let text = screen(&mut app, 80, 30);
        assert!(text.contains("Keys"));
        assert!(text.contains("run cell"));
    }
}
