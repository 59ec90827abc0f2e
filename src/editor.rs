//! The text-editing surface attached to the active cell.
//!
//! The app only talks to [`EditorSurface`]; [`TextAreaEditor`] backs it with
//! `tui-textarea`. Key bindings and the completion vocabulary are plain data
//! handed to the app alongside the editor.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::{
    Frame,
    layout::Rect,
    style::{Modifier, Style},
};
use tui_textarea::{CursorMove, TextArea};

pub trait EditorSurface {
    fn text(&self) -> String;
    fn set_text(&mut self, text: &str);
    fn set_focused(&mut self, focused: bool);
    fn is_focused(&self) -> bool;
    /// Feed one key press. Returns the full new text when the key changed it.
    fn input(&mut self, key: KeyEvent) -> Option<String>;
    fn insert_str(&mut self, text: &str) -> String;
    fn word_before_cursor(&self) -> String;
    /// Swap the word left of the cursor for `replacement`; returns the new text.
    fn replace_word_before_cursor(&mut self, replacement: &str) -> String;
    fn render(&self, frame: &mut Frame, area: Rect);
}

pub struct TextAreaEditor {
    textarea: TextArea<'static>,
    focused: bool,
}

impl Default for TextAreaEditor {
    fn default() -> Self {
        Self::new()
    }
}

impl TextAreaEditor {
    pub fn new() -> Self {
        let mut editor = Self {
            textarea: TextArea::default(),
            focused: false,
        };
        editor.apply_styles();
        editor
    }

    fn apply_styles(&mut self) {
        self.textarea.set_cursor_line_style(Style::default());
        let cursor = if self.focused {
            Style::default().add_modifier(Modifier::REVERSED)
        } else {
            Style::default()
        };
        self.textarea.set_cursor_style(cursor);
    }
}

impl EditorSurface for TextAreaEditor {
    fn text(&self) -> String {
        self.textarea.lines().join("\n")
    }

    fn set_text(&mut self, text: &str) {
        let lines: Vec<String> = text.split('\n').map(|l| l.to_string()).collect();
        self.textarea = TextArea::new(lines);
        self.textarea.move_cursor(CursorMove::Bottom);
        self.textarea.move_cursor(CursorMove::End);
        self.apply_styles();
    }

    fn set_focused(&mut self, focused: bool) {
        self.focused = focused;
        self.apply_styles();
    }

    fn is_focused(&self) -> bool {
        self.focused
    }

    fn input(&mut self, key: KeyEvent) -> Option<String> {
        if self.textarea.input(key) {
            Some(self.text())
        } else {
            None
        }
    }

    fn insert_str(&mut self, text: &str) -> String {
        self.textarea.insert_str(text);
        self.text()
    }

    fn word_before_cursor(&self) -> String {
        let (row, col) = self.textarea.cursor();
        let Some(line) = self.textarea.lines().get(row) else {
            return String::new();
        };
        let head: Vec<char> = line.chars().take(col).collect();
        let start = head
            .iter()
            .rposition(|c| !is_word_char(*c))
            .map(|i| i + 1)
            .unwrap_or(0);
        head[start..].iter().collect()
    }

    fn replace_word_before_cursor(&mut self, replacement: &str) -> String {
        let word_len = self.word_before_cursor().chars().count();
        for _ in 0..word_len {
            self.textarea.delete_char();
        }
        self.textarea.insert_str(replacement);
        self.text()
    }

    fn render(&self, frame: &mut Frame, area: Rect) {
        frame.render_widget(&self.textarea, area);
    }
}

pub fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorCommand {
    Run,
    ClearResult,
    Complete,
    Format,
}

/// Keys intercepted before they reach the editor.
#[derive(Debug, Clone, Default)]
pub struct KeyBindings {
    bindings: Vec<(KeyCode, KeyModifiers, EditorCommand)>,
}

impl KeyBindings {
    pub fn with_defaults() -> Self {
        let mut kb = Self::default();
        kb.register(KeyCode::Enter, KeyModifiers::CONTROL, EditorCommand::Run)
            .register(KeyCode::Char('r'), KeyModifiers::CONTROL, EditorCommand::Run)
            .register(KeyCode::F(5), KeyModifiers::NONE, EditorCommand::Run)
            .register(KeyCode::Esc, KeyModifiers::NONE, EditorCommand::ClearResult)
            .register(KeyCode::Tab, KeyModifiers::NONE, EditorCommand::Complete)
            .register(KeyCode::Char('f'), KeyModifiers::CONTROL, EditorCommand::Format);
        kb
    }

    /// Later registrations for the same key win.
    pub fn register(
        &mut self,
        code: KeyCode,
        modifiers: KeyModifiers,
        command: EditorCommand,
    ) -> &mut Self {
        self.bindings
            .retain(|(c, m, _)| !(*c == code && *m == modifiers));
        self.bindings.push((code, modifiers, command));
        self
    }

    pub fn lookup(&self, key: &KeyEvent) -> Option<EditorCommand> {
        self.bindings
            .iter()
            .find(|(code, mods, _)| *code == key.code && *mods == key.modifiers)
            .map(|(_, _, cmd)| *cmd)
    }
}

const SQL_KEYWORDS: &[&str] = &[
    "SELECT", "FROM", "WHERE", "AND", "OR", "NOT", "NULL", "IS", "IN", "LIKE", "BETWEEN",
    "ORDER", "BY", "GROUP", "HAVING", "LIMIT", "OFFSET", "AS", "DISTINCT", "JOIN", "LEFT",
    "RIGHT", "INNER", "OUTER", "CROSS", "ON", "UNION", "ALL", "INSERT", "INTO", "VALUES",
    "UPDATE", "SET", "DELETE", "CREATE", "TABLE", "DROP", "ALTER", "INDEX", "PRIMARY", "KEY",
    "DEFAULT", "CASE", "WHEN", "THEN", "ELSE", "END", "ASC", "DESC", "EXISTS", "WITH",
];

const SQL_FUNCTIONS: &[&str] = &[
    "COUNT", "SUM", "AVG", "MIN", "MAX", "COALESCE", "IFNULL", "LENGTH", "LOWER", "UPPER",
    "SUBSTR", "TRIM", "ROUND", "ABS", "DATE", "DATETIME", "STRFTIME", "CAST", "REPLACE",
];

/// Sample schema names offered as suggestions only; nothing is validated.
const SAMPLE_IDENTIFIERS: &[&str] = &[
    "users", "orders", "products", "id", "name", "email", "age", "created_at", "user_id",
    "total", "price",
];

/// Vocabulary for suggestions and keyword coloring.
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    pub keywords: &'static [&'static str],
    pub functions: &'static [&'static str],
    pub identifiers: &'static [&'static str],
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            keywords: SQL_KEYWORDS,
            functions: SQL_FUNCTIONS,
            identifiers: SAMPLE_IDENTIFIERS,
        }
    }
}

impl CompletionConfig {
    /// Candidates extending `prefix`: keywords, then functions, then identifiers.
    pub fn suggestions(&self, prefix: &str) -> Vec<&'static str> {
        if prefix.is_empty() {
            return Vec::new();
        }
        let mut out: Vec<&'static str> = Vec::new();
        for &candidate in self
            .keywords
            .iter()
            .chain(self.functions)
            .chain(self.identifiers)
        {
            let extends = candidate.len() > prefix.len()
                && candidate
                    .get(..prefix.len())
                    .is_some_and(|head| head.eq_ignore_ascii_case(prefix));
            if extends && !out.contains(&candidate) {
                out.push(candidate);
            }
        }
        out
    }

    pub fn is_keyword(&self, word: &str) -> bool {
        self.keywords.iter().any(|k| k.eq_ignore_ascii_case(word))
    }

    pub fn is_function(&self, word: &str) -> bool {
        self.functions.iter().any(|k| k.eq_ignore_ascii_case(word))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn set_text_round_trips_multiline() {
        let mut ed = TextAreaEditor::new();
        ed.set_text("SELECT *\nFROM t\n");
        assert_eq!(ed.text(), "SELECT *\nFROM t\n");
    }

    #[test]
    fn typing_reports_full_text() {
        let mut ed = TextAreaEditor::new();
        ed.set_text("SELEC");
        assert_eq!(ed.input(key(KeyCode::Char('T'))), Some("SELECT".to_string()));
        // cursor movement does not change the text
        assert_eq!(ed.input(key(KeyCode::Left)), None);
    }

    #[test]
    fn word_before_cursor_stops_at_punctuation() {
        let mut ed = TextAreaEditor::new();
        ed.set_text("SELECT u.na");
        assert_eq!(ed.word_before_cursor(), "na");
        ed.set_text("x ");
        assert_eq!(ed.word_before_cursor(), "");
    }

    #[test]
    fn replace_word_swaps_prefix() {
        let mut ed = TextAreaEditor::new();
        ed.set_text("sel");
        assert_eq!(ed.replace_word_before_cursor("SELECT"), "SELECT");
    }

    #[test]
    fn focus_is_tracked() {
        let mut ed = TextAreaEditor::new();
        assert!(!ed.is_focused());
        ed.set_focused(true);
        assert!(ed.is_focused());
    }

    #[test]
    fn default_bindings_cover_run_and_clear() {
        let kb = KeyBindings::with_defaults();
        assert_eq!(kb.lookup(&key(KeyCode::F(5))), Some(EditorCommand::Run));
        assert_eq!(
            kb.lookup(&KeyEvent::new(KeyCode::Enter, KeyModifiers::CONTROL)),
            Some(EditorCommand::Run)
        );
        assert_eq!(kb.lookup(&key(KeyCode::Esc)), Some(EditorCommand::ClearResult));
        assert_eq!(kb.lookup(&key(KeyCode::Enter)), None);
        assert_eq!(kb.lookup(&key(KeyCode::Char('r'))), None);
    }

    #[test]
    fn register_overrides_existing_binding() {
        let mut kb = KeyBindings::with_defaults();
        kb.register(KeyCode::Tab, KeyModifiers::NONE, EditorCommand::Format);
        assert_eq!(kb.lookup(&key(KeyCode::Tab)), Some(EditorCommand::Format));
    }

    #[test]
    fn suggestions_are_case_insensitive_and_ordered() {
        let cfg = CompletionConfig::default();
        assert_eq!(cfg.suggestions("sel"), vec!["SELECT"]);
        let co = cfg.suggestions("co");
        assert_eq!(co, vec!["COUNT", "COALESCE"]);
        assert_eq!(cfg.suggestions("us"), vec!["users", "user_id"]);
        assert!(cfg.suggestions("").is_empty());
        assert!(cfg.suggestions("select").is_empty());
    }

    #[test]
    fn keyword_and_function_lookup() {
        let cfg = CompletionConfig::default();
        assert!(cfg.is_keyword("from"));
        assert!(cfg.is_function("count"));
        assert!(!cfg.is_keyword("users"));
    }
}
