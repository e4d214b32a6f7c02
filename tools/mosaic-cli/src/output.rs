//! Output formatting for the CLI.

use console::{style, StyledObject};

/// Output handler for CLI messages.
///
/// In JSON mode only [`Output::json`] and errors are printed, so stdout stays
/// machine-readable.
#[derive(Clone)]
pub struct Output {
    verbose: bool,
    json: bool,
}

impl Output {
    pub fn new(verbose: bool, json: bool) -> Self {
        Self { verbose, json }
    }

    pub fn is_json(&self) -> bool {
        self.json
    }

    fn line(&self, marker: StyledObject<&str>, msg: &str) {
        if !self.json {
            println!("{} {}", marker, msg);
        }
    }

    pub fn info(&self, msg: &str) {
        self.line(style("·").blue(), msg);
    }

    pub fn success(&self, msg: &str) {
        self.line(style("✓").green(), msg);
    }

    /// Warnings go to stderr.
    pub fn warn(&self, msg: &str) {
        if !self.json {
            eprintln!("{} {}", style("!").yellow().bold(), msg);
        }
    }

    pub fn error(&self, msg: &str) {
        if self.json {
            eprintln!("{}", serde_json::json!({ "error": msg }));
        } else {
            eprintln!("{} {}", style("✗").red(), style(msg).red());
        }
    }

    /// Only printed with `--verbose`.
    pub fn debug(&self, msg: &str) {
        if self.verbose && !self.json {
            eprintln!("{}", style(msg).dim());
        }
    }

    pub fn header(&self, msg: &str) {
        if !self.json {
            println!("\n{}", style(msg).bold().underlined());
        }
    }

    /// A numbered simulation step.
    pub fn step(&self, num: usize, total: usize, msg: &str) {
        if !self.json {
            println!("{} {}", style(format!("[{}/{}]", num, total)).dim(), msg);
        }
    }

    pub fn json<T: serde::Serialize>(&self, value: &T) {
        if let Ok(json) = serde_json::to_string_pretty(value) {
            println!("{}", json);
        }
    }

    pub fn kv(&self, key: &str, value: &str) {
        if !self.json {
            println!("  {:<14} {}", style(key).dim(), value);
        }
    }

    /// An indented log line under a step.
    pub fn list_item(&self, item: &str) {
        if !self.json {
            println!("    {}", item);
        }
    }

    /// Columns padded to `widths`; extra columns are printed unpadded.
    pub fn table_row(&self, cols: &[&str], widths: &[usize]) {
        if self.json {
            return;
        }
        let row: Vec<String> = cols
            .iter()
            .enumerate()
            .map(|(i, col)| match widths.get(i) {
                Some(width) => format!("{:width$}", col, width = width),
                None => col.to_string(),
            })
            .collect();
        println!("  {}", row.join("  ").trim_end());
    }
}

/// Colored badge for a slot change.
pub fn change_badge(change: &str) -> String {
    match change {
        "rendered" => style(change).green().to_string(),
        "replaced" | "rerendered" => style(change).yellow().to_string(),
        "removed" => style(change).red().to_string(),
        "unchanged" => style(change).dim().to_string(),
        _ => change.to_string(),
    }
}

/// Render a JSON value compactly, `-` for null.
pub fn format_props(props: &serde_json::Value) -> String {
    if props.is_null() {
        "-".to_string()
    } else {
        props.to_string()
    }
}
