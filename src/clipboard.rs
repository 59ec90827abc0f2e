use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

#[derive(Debug)]
pub enum Copied {
    Clipboard(&'static str),
    File(PathBuf),
}

/// Best-effort clipboard copy; falls back to writing a temp file.
pub fn copy_text(content: &str, label: &str) -> std::io::Result<Copied> {
    // Try platform clipboards in order
    let candidates: &[(&'static str, &[&str])] = &[
        // macOS
        ("pbcopy", &[]),
        // Wayland
        ("wl-copy", &[]),
        // X11
        ("xclip", &["-selection", "clipboard"]),
        ("xsel", &["--clipboard", "--input"]),
        // Windows
        ("clip", &[]),
    ];
    for (prog, args) in candidates {
        if try_clipboard_prog(prog, args, content) {
            return Ok(Copied::Clipboard(*prog));
        }
    }

    let mut file_path = std::env::temp_dir();
    let ts = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    file_path.push(format!("sql-notebook-{label}-{ts}.txt"));
    std::fs::write(&file_path, content.as_bytes())?;
    Ok(Copied::File(file_path))
}

fn try_clipboard_prog(prog: &str, args: &[&str], content: &str) -> bool {
    match Command::new(prog)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
    {
        Ok(mut child) => {
            if let Some(mut stdin) = child.stdin.take() {
                let _ = stdin.write_all(content.as_bytes());
            }
            child.wait().map(|s| s.success()).unwrap_or(false)
        }
        Err(_) => false,
    }
}
