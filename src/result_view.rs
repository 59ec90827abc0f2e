//! Shape-driven interpretation of a cell's raw result text.
//!
//! The execution command answers with text that is usually JSON: an array of
//! row objects, or an object carrying `message`/`error`. [`ResultView::parse`]
//! turns that text into a view model that `ui` draws. Anything that does not
//! parse is shown verbatim.

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableValue {
    /// JSON `null`, drawn as a marker rather than the word "null"
    Null,
    /// Row object without this column
    Missing,
    Text(String),
}

impl TableValue {
    fn from_json(value: Option<&Value>) -> Self {
        match value {
            None => TableValue::Missing,
            Some(Value::Null) => TableValue::Null,
            Some(Value::String(s)) => TableValue::Text(s.clone()),
            Some(other) => TableValue::Text(other.to_string()),
        }
    }

    pub fn as_text(&self) -> &str {
        match self {
            TableValue::Null => "NULL",
            TableValue::Missing => "",
            TableValue::Text(s) => s,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<TableValue>>,
}

impl ResultTable {
    /// Header name used when rows are bare values instead of objects.
    pub const VALUE_COLUMN: &'static str = "value";

    fn from_rows(items: &[Value]) -> Self {
        match items.first() {
            Some(Value::Object(first)) => {
                let headers: Vec<String> = first.keys().cloned().collect();
                let rows = items
                    .iter()
                    .map(|item| {
                        headers
                            .iter()
                            .map(|h| TableValue::from_json(item.as_object().and_then(|o| o.get(h))))
                            .collect()
                    })
                    .collect();
                Self { headers, rows }
            }
            _ => Self {
                headers: vec![Self::VALUE_COLUMN.to_string()],
                rows: items
                    .iter()
                    .map(|item| vec![TableValue::from_json(Some(item))])
                    .collect(),
            },
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.headers.len()
    }

    pub fn footer(&self) -> String {
        let rows = self.row_count();
        format!(
            "{} row{} · {} columns",
            rows,
            if rows == 1 { "" } else { "s" },
            self.column_count()
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultView {
    /// Not JSON; shown as preformatted text
    Raw(String),
    Message { kind: MessageKind, body: String },
    NoRows,
    Table(ResultTable),
    /// Any other JSON value, pretty-printed
    Json(String),
}

impl ResultView {
    pub const NO_ROWS_NOTICE: &'static str = "No rows returned";

    pub fn parse(text: &str) -> Self {
        let value: Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(_) => return ResultView::Raw(text.to_string()),
        };

        match &value {
            Value::Object(map) if map.contains_key("error") || map.contains_key("message") => {
                let kind = if map.contains_key("error") {
                    MessageKind::Error
                } else {
                    MessageKind::Info
                };
                ResultView::Message {
                    kind,
                    body: pretty(&value, text),
                }
            }
            Value::Array(items) if items.is_empty() => ResultView::NoRows,
            Value::Array(items) => ResultView::Table(ResultTable::from_rows(items)),
            _ => ResultView::Json(pretty(&value, text)),
        }
    }

    /// Lines needed to draw the view, not counting panel chrome.
    pub fn content_height(&self) -> usize {
        match self {
            ResultView::Raw(s) | ResultView::Json(s) => s.lines().count().max(1),
            // boxed: two border rows
            ResultView::Message { body, .. } => body.lines().count() + 2,
            ResultView::NoRows => 1,
            // header + rows + footer
            ResultView::Table(t) => t.row_count() + 2,
        }
    }
}

fn pretty(value: &Value, fallback: &str) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| fallback.to_string())
}
