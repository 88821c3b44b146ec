/// Format a duration in seconds, e.g. 65 seconds becomes "1m 5s"
pub fn format_duration(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    if total == 0 && seconds > 0.0 {
        return format!("{}ms", (seconds * 1000.0) as u64);
    }

    let (days, rem) = (total / 86_400, total % 86_400);
    let (hours, rem) = (rem / 3_600, rem % 3_600);
    let (minutes, secs) = (rem / 60, rem % 60);

    match (days, hours, minutes) {
        (0, 0, 0) => format!("{}s", secs),
        (0, 0, _) => format!("{}m {}s", minutes, secs),
        (0, _, _) => format!("{}h {}m {}s", hours, minutes, secs),
        _ => format!("{}d {}h {}m {}s", days, hours, minutes, secs),
    }
}

/// Format a blocks-per-second rate, scaling slow rates to minutes or hours
pub fn format_rate(blocks_per_second: f64) -> String {
    if blocks_per_second < 0.01 {
        format!("{:.2} blocks/hour", blocks_per_second * 3600.0)
    } else if blocks_per_second < 1.0 {
        format!("{:.2} blocks/min", blocks_per_second * 60.0)
    } else {
        format!("{:.2} blocks/sec", blocks_per_second)
    }
}
