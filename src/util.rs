pub fn clamp_percent(value: i64) -> u8 {
    value.clamp(0, 100) as u8
}

/// Money amount with two decimals, as shown next to a running session.
pub fn format_earned(amount: f64) -> String {
    format!("{:.2}", amount)
}

/// Fixed-width text bar such as `[#####-----]` for a percentage.
pub fn progress_bar(percent: u8, width: usize) -> String {
    let percent = usize::from(percent.min(100));
    let filled = percent * width / 100;

    format!("[{}{}]", "#".repeat(filled), "-".repeat(width - filled))
}
