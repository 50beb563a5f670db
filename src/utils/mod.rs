use std::time::Instant;
use tracing::info;

/// Logs how long a CLI command took when dropped.
pub struct Timer {
    label: String,
    start: Instant,
}

impl Timer {
    pub fn start(label: impl Into<String>) -> Self {
        let label = label.into();
        info!("⏱  Starting: {}", label);
        Self {
            label,
            start: Instant::now(),
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        info!("⏱  Finished: {} (took {:.2?})", self.label, self.start.elapsed());
    }
}

/// First `max` chars of a body on one line, for upstream-drift diagnostics.
pub fn snippet(body: &str, max: usize) -> String {
    let flat: String = body.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max {
        return flat;
    }
    let mut out: String = flat.chars().take(max).collect();
    out.push('…');
    out
}

/// Format a dollar amount with thousands separators, keeping the sign.
pub fn fmt_money(v: f64) -> String {
    let cents = (v.abs() * 100.0).round() as i64;
    let sign = if v < 0.0 && cents != 0 { "-" } else { "" };
    format!("{}${}.{:02}", sign, group_thousands((cents / 100) as u64), cents % 100)
}

/// Format a large integer with thousands separators.
pub fn fmt_number(n: i64) -> String {
    let grouped = group_thousands(n.unsigned_abs());
    if n < 0 { format!("-{}", grouped) } else { grouped }
}

fn group_thousands(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::new();
    for (i, ch) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(ch);
    }
    result.chars().rev().collect()
}
