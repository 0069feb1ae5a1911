use std::time::Duration;

use crate::clock::error::ClockError;

const SECONDS_PER_MINUTE: u64 = 60;
const SECONDS_PER_HOUR: u64 = 3_600;
const DECISECOND_DISPLAY_BELOW: Duration = Duration::from_secs(10);

/// Renders remaining time as `[H:]MM:SS`, with a trailing `.D` decisecond
/// digit once the value drops under ten seconds.
pub fn format_clock_time(value: Duration) -> String {
    let total_secs = value.as_secs();
    let hours = total_secs / SECONDS_PER_HOUR;
    let minutes = (total_secs % SECONDS_PER_HOUR) / SECONDS_PER_MINUTE;
    let seconds = total_secs % SECONDS_PER_MINUTE;

    let mut text = if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes:02}:{seconds:02}")
    };
    if value < DECISECOND_DISPLAY_BELOW {
        let decis = value.subsec_millis() / 100;
        text.push_str(&format!(".{decis}"));
    }
    text
}

/// Parses `MM:SS` (or `MM.SS`) into a duration. The first field is always
/// minutes.
pub fn parse_clock_time(input: &str) -> Result<Duration, ClockError> {
    let trimmed = input.trim();
    let fields = trimmed.split([':', '.']).collect::<Vec<_>>();
    if fields.len() != 2 {
        return Err(ClockError::format(
            input,
            "expected two fields in the form mm:ss",
        ));
    }

    let minutes = parse_field(input, fields[0], "minutes")?;
    let seconds = parse_field(input, fields[1], "seconds")?;
    let total = minutes
        .checked_mul(SECONDS_PER_MINUTE)
        .and_then(|secs| secs.checked_add(seconds))
        .ok_or_else(|| ClockError::format(input, "value is too large"))?;
    Ok(Duration::from_secs(total))
}

fn parse_field(input: &str, field: &str, name: &str) -> Result<u64, ClockError> {
    if field.is_empty() {
        return Err(ClockError::format(input, format!("missing {name}")));
    }
    field
        .parse::<u64>()
        .map_err(|_| ClockError::format(input, format!("{name} must be a whole number")))
}

pub fn duration_as_millis<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    let millis = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
    serializer.serialize_u64(millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_minutes_and_seconds() {
        assert_eq!(format_clock_time(Duration::from_secs(300)), "05:00");
        assert_eq!(format_clock_time(Duration::from_secs(59)), "00:59");
        assert_eq!(format_clock_time(Duration::from_secs(10)), "00:10");
    }

    #[test]
    fn formats_hours_only_when_present() {
        assert_eq!(format_clock_time(Duration::from_secs(3_600)), "1:00:00");
        assert_eq!(format_clock_time(Duration::from_secs(5_405)), "1:30:05");
        assert_eq!(format_clock_time(Duration::from_secs(3_599)), "59:59");
    }

    #[test]
    fn switches_to_deciseconds_under_ten_seconds() {
        assert_eq!(format_clock_time(Duration::from_millis(9_370)), "00:09.3");
        assert_eq!(format_clock_time(Duration::from_millis(9_999)), "00:09.9");
        assert_eq!(format_clock_time(Duration::from_secs(9)), "00:09.0");
        assert_eq!(format_clock_time(Duration::ZERO), "00:00.0");
        assert_eq!(format_clock_time(Duration::from_millis(10_950)), "00:10");
    }

    #[test]
    fn parses_minutes_and_seconds() {
        assert_eq!(
            parse_clock_time("05:00").expect("05:00"),
            Duration::from_secs(300)
        );
        assert_eq!(
            parse_clock_time("00:05").expect("00:05"),
            Duration::from_secs(5)
        );
        assert_eq!(
            parse_clock_time("1.30").expect("1.30"),
            Duration::from_secs(90)
        );
        assert_eq!(
            parse_clock_time(" 90:00 ").expect("90:00"),
            Duration::from_secs(5_400)
        );
    }

    #[test]
    fn rejects_malformed_input() {
        for bad in ["", "5", "1:2:3", "aa:00", "05:", ":30", "-1:00", "1:xx"] {
            let err = parse_clock_time(bad).expect_err("malformed input should fail");
            assert!(matches!(err, ClockError::Format { .. }), "{bad}: {err}");
        }
    }

    #[test]
    fn saturating_subtraction_never_goes_negative() {
        let remaining = Duration::from_millis(50);
        assert_eq!(remaining.saturating_sub(Duration::from_secs(1)), Duration::ZERO);
    }
}
