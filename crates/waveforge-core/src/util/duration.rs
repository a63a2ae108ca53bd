use std::time::Duration;

/// Parse a human duration like `"30s"`, `"5m"`, `"500ms"`, `"2h"`, `"1d"`. A bare
/// integer is interpreted as milliseconds (matching `WORKFLOW_ENGINE_TIMEOUT`'s unit).
pub fn parse_duration(input: &str) -> Option<Duration> {
    let s = input.trim();
    if s.is_empty() {
        return None;
    }
    let (number_part, unit) = split_trailing_unit(s);
    let value: f64 = number_part.parse().ok()?;
    let millis = match unit {
        "ms" => value,
        "s" | "" => value * 1000.0,
        "m" => value * 60_000.0,
        "h" => value * 3_600_000.0,
        "d" => value * 86_400_000.0,
        _ => return None,
    };
    if millis < 0.0 {
        return None;
    }
    Some(Duration::from_millis(millis as u64))
}

fn split_trailing_unit(s: &str) -> (&str, &str) {
    let split_at = s
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_alphabetic())
        .last()
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    (&s[..split_at], &s[split_at..])
}

/// Render a duration as `<seconds>.<hundredths>s`, matching the run summary line
/// format (`duration: <d.dd>s`).
pub fn format_duration(d: Duration) -> String {
    format!("{:.2}s", d.as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_units() {
        assert_eq!(parse_duration("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("5m"), Some(Duration::from_secs(300)));
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("1h"), Some(Duration::from_secs(3600)));
    }

    #[test]
    fn bare_integer_is_milliseconds() {
        assert_eq!(parse_duration("1500"), Some(Duration::from_millis(1500)));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_duration("not-a-duration"), None);
    }

    #[test]
    fn formats_with_two_decimals() {
        assert_eq!(format_duration(Duration::from_millis(1234)), "1.23s");
    }
}
