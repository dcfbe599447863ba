//! Small formatting helpers.

/// Formats a millisecond position as `h:mm:ss`.
///
/// Hours are not padded and grow past 24; sub-second remainders are dropped.
///
/// # Examples
///
/// ```rust
/// use nodelink::util::format_time;
///
/// assert_eq!(format_time(212_000), "0:03:32");
/// ```
#[must_use]
pub fn format_time(millis: u64) -> String {
    let seconds = millis / 1000;
    let (hours, rest) = (seconds / 3600, seconds % 3600);
    let (minutes, seconds) = (rest / 60, rest % 60);
    format!("{hours}:{minutes:02}:{seconds:02}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pads_minutes_and_seconds() {
        assert_eq!(format_time(0), "0:00:00");
        assert_eq!(format_time(999), "0:00:00");
        assert_eq!(format_time(61_000), "0:01:01");
        assert_eq!(format_time(3_600_000), "1:00:00");
        assert_eq!(format_time(90_061_500), "25:01:01");
    }
}
