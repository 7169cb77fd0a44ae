/*!
 * devtel CLI Style System
 *
 * Styling helpers for the interactive commands (`status`, `flush --dry-run`).
 * `track` runs inside hooks and never prints.
 */

use chrono::{TimeZone, Utc};
use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};
use console::{style, StyledObject};
use devtel_core_store::StoredRecord;
use serde_json::Value;

// ============================================================================
// THEME COLORS
// ============================================================================

/// Colors for consistent styling
pub struct Theme;

impl Theme {
    /// Primary accent color (cyan)
    pub fn primary<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).cyan()
    }

    /// Success color (green)
    pub fn success<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).green()
    }

    /// Warning color (yellow)
    pub fn warning<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).yellow()
    }

    /// Error color (red)
    pub fn error<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).red()
    }

    /// Muted/secondary text (dim)
    pub fn muted<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).dim()
    }
}

/// Unicode icons for visual feedback
pub struct Icons;

impl Icons {
    pub const SUCCESS: &'static str = "✓";
    pub const ERROR: &'static str = "✗";
    pub const WARNING: &'static str = "⚠";
    pub const INFO: &'static str = "ℹ";
    pub const PENDING: &'static str = "○";
    pub const ARROW_RIGHT: &'static str = "→";
}

// ============================================================================
// TABLES
// ============================================================================

/// Create a styled table with default settings
pub fn create_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Create a minimal table (no outer borders)
pub fn create_minimal_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_NO_BORDERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Create a key-value table for stats
pub fn stats_table(items: &[(&str, String)]) -> Table {
    let mut table = create_minimal_table();

    for (key, value) in items {
        table.add_row(vec![
            Cell::new(key).fg(Color::Cyan),
            Cell::new(value)
                .fg(Color::White)
                .add_attribute(Attribute::Bold),
        ]);
    }

    table
}

/// One row per stored record: hook, status, time, duration, delivery state
pub fn records_table(records: &[StoredRecord]) -> Table {
    let mut table = create_table();
    table.set_header(vec![
        header_cell("Key"),
        header_cell("Status"),
        header_cell("Time"),
        header_cell("Duration"),
        header_cell("Delivered"),
    ]);

    for record in records {
        let status = record
            .field("status")
            .and_then(Value::as_str)
            .unwrap_or("-")
            .to_string();
        let status_cell = if status == "error" {
            Cell::new(status).fg(Color::Red)
        } else {
            Cell::new(status)
        };

        let time = record
            .field("timestamp")
            .and_then(Value::as_i64)
            .map(format_timestamp)
            .unwrap_or_else(|| "-".to_string());
        let duration = record
            .field("duration_ms")
            .and_then(Value::as_i64)
            .map(format_duration_ms)
            .unwrap_or_else(|| "-".to_string());

        let delivered = if record.processed {
            Cell::new(Icons::SUCCESS).fg(Color::Green)
        } else {
            Cell::new(Icons::PENDING).fg(Color::Yellow)
        };

        table.add_row(vec![
            Cell::new(&record.key),
            status_cell,
            Cell::new(time),
            Cell::new(duration),
            delivered,
        ]);
    }

    table
}

fn header_cell(title: &str) -> Cell {
    Cell::new(title)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

// ============================================================================
// FORMATTING
// ============================================================================

/// Format a millisecond duration into a human-readable string
pub fn format_duration_ms(ms: i64) -> String {
    if ms < 1000 {
        return format!("{}ms", ms);
    }
    let secs = ms as f64 / 1000.0;
    if secs < 60.0 {
        format!("{:.1}s", secs)
    } else if secs < 3600.0 {
        let mins = (secs / 60.0).floor();
        let remaining = secs % 60.0;
        format!("{}m {:.0}s", mins, remaining)
    } else {
        let hours = (secs / 3600.0).floor();
        let mins = ((secs % 3600.0) / 60.0).floor();
        format!("{}h {}m", hours, mins)
    }
}

/// Format epoch milliseconds as UTC
pub fn format_timestamp(ms: i64) -> String {
    match Utc.timestamp_millis_opt(ms).single() {
        Some(time) => time.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => ms.to_string(),
    }
}

// ============================================================================
// MESSAGES
// ============================================================================

/// Print a styled error message with optional suggestion
pub fn print_error(message: &str, suggestion: Option<&str>) {
    eprintln!(
        "{} {}",
        Theme::error(format!("{} Error:", Icons::ERROR)),
        message
    );

    if let Some(hint) = suggestion {
        eprintln!(
            "  {} {}",
            Theme::muted(Icons::ARROW_RIGHT),
            Theme::muted(hint)
        );
    }
}

/// Print a styled warning message
pub fn print_warning(message: &str) {
    eprintln!(
        "{} {}",
        Theme::warning(Icons::WARNING.to_string()),
        Theme::warning(message)
    );
}

/// Print a styled success message
pub fn print_success(message: &str) {
    println!(
        "{} {}",
        Theme::success(Icons::SUCCESS.to_string()),
        Theme::success(message)
    );
}

/// Print a styled info message
pub fn print_info(message: &str) {
    println!("{} {}", Theme::primary(Icons::INFO.to_string()), message);
}

// ============================================================================
// TESTS
// ============================================================================
