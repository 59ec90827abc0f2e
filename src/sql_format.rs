//! Line-breaking "format" for SQL text.
//!
//! Word-level heuristic, not a lexer: keywords inside string literals or
//! comments are broken too.

/// Words that start a new line. Matched case-insensitively on word boundaries.
const BREAK_BEFORE: &[&str] = &[
    "SELECT", "FROM", "WHERE", "GROUP", "ORDER", "HAVING", "LIMIT", "OFFSET", "INSERT", "VALUES",
    "UPDATE", "SET", "DELETE", "LEFT", "RIGHT", "INNER", "FULL", "CROSS", "JOIN", "UNION",
];

/// Keyword pairs that stay on one line, e.g. `LEFT JOIN`, `DELETE FROM`.
const COMPOUNDS: &[(&str, &str)] = &[
    ("DELETE", "FROM"),
    ("LEFT", "JOIN"),
    ("RIGHT", "JOIN"),
    ("INNER", "JOIN"),
    ("FULL", "JOIN"),
    ("CROSS", "JOIN"),
    ("OUTER", "JOIN"),
    ("LEFT", "OUTER"),
    ("RIGHT", "OUTER"),
    ("FULL", "OUTER"),
];

pub fn format_sql(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 16);
    // Last word, when it was a keyword and only whitespace followed it
    let mut prev_keyword: Option<&'static str> = None;
    let mut chars = sql.char_indices().peekable();

    while let Some((start, ch)) = chars.next() {
        if is_word_char(ch) {
            let mut end = start + ch.len_utf8();
            while let Some(&(i, c)) = chars.peek() {
                if !is_word_char(c) {
                    break;
                }
                end = i + c.len_utf8();
                chars.next();
            }
            let word = &sql[start..end];
            let keyword = known_keyword(word);
            if let Some(kw) = keyword
                && BREAK_BEFORE.contains(&kw)
                && !prev_keyword.is_some_and(|prev| COMPOUNDS.contains(&(prev, kw)))
            {
                break_line(&mut out);
            }
            out.push_str(word);
            prev_keyword = keyword;
        } else if ch == ';' {
            out.push_str(";\n");
            while chars.peek().is_some_and(|&(_, c)| c.is_whitespace()) {
                chars.next();
            }
            prev_keyword = None;
        } else {
            if !ch.is_whitespace() {
                prev_keyword = None;
            }
            out.push(ch);
        }
    }

    out.trim().to_string()
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn known_keyword(word: &str) -> Option<&'static str> {
    BREAK_BEFORE
        .iter()
        .chain(std::iter::once(&"OUTER"))
        .find(|kw| kw.eq_ignore_ascii_case(word))
        .copied()
}

fn break_line(out: &mut String) {
    let kept = out.trim_end().len();
    out.truncate(kept);
    if !out.is_empty() {
        out.push('\n');
    }
}
