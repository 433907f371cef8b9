//! Human-readable byte counts for the optimization report.

const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];

/// `1536` becomes `1.5 KiB`; values under one KiB stay in bytes.
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{bytes} B");
    }

    let mut value = bytes as f64 / 1024.0;
    let mut unit = UNITS[0];
    for next in &UNITS[1..] {
        if value < 1024.0 {
            break;
        }
        value /= 1024.0;
        unit = next;
    }

    let precision = if value >= 10.0 { 1 } else { 2 };
    let rendered = format!("{value:.precision$}");
    let rendered = rendered.trim_end_matches('0').trim_end_matches('.');
    format!("{rendered} {unit}")
}

/// Share of `before` removed by shrinking to `after`, as a whole percentage.
pub fn percent_saved(before: u64, after: u64) -> u64 {
    if before == 0 {
        return 0;
    }
    before.saturating_sub(after) * 100 / before
}
