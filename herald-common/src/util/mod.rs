use std::fmt::Display;
use std::num::ParseIntError;
use std::time::Duration;

pub mod regex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseToMillisError {
    /// The input was not made up of `<amount><unit>` groups.
    InvalidFormat,
    ParseIntError(ParseIntError),
    Overflow,
}

impl Display for ParseToMillisError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidFormat => f.write_str("input is not a valid time (expected e.g. 1h20m30s)"),
            Self::ParseIntError(err) => write!(f, "failed to parse time amount: {err}"),
            Self::Overflow => f.write_str("time is too large"),
        }
    }
}
impl std::error::Error for ParseToMillisError {}

impl From<ParseIntError> for ParseToMillisError {
    fn from(value: ParseIntError) -> Self {
        Self::ParseIntError(value)
    }
}

/// Parses a time string such as `1h20m30s` into milliseconds.
///
/// Supported units are `s`, `m`, `h` and `d`. Units may repeat (`30s30s` is one minute).
pub fn parse_to_millis(input: &str) -> Result<u64, ParseToMillisError> {
    if !regex::FULL_TIME_STRING.is_match(input) {
        return Err(ParseToMillisError::InvalidFormat);
    }

    let mut total: u64 = 0;

    for current in regex::TIME_STRING.captures_iter(input) {
        let amount = current[1].parse::<u64>()?;

        let unit: u64 = match &current[2] {
            "s" => 1000,
            "m" => 60 * 1000,
            "h" => 60 * 60 * 1000,
            "d" => 24 * 60 * 60 * 1000,
            _ => unreachable!(),
        };

        total = amount
            .checked_mul(unit)
            .and_then(|x| x.checked_add(total))
            .ok_or(ParseToMillisError::Overflow)?;
    }

    Ok(total)
}

/// Parses a time string such as `1h20m30s` into a [`Duration`].
pub fn parse_duration(input: &str) -> Result<Duration, ParseToMillisError> {
    parse_to_millis(input).map(Duration::from_millis)
}

/// Returns the user ID if `content` starts with a user mention (`<@id>` or `<@!id>`), along with
/// the byte length of the mention.
pub fn leading_user_mention(content: &str) -> Option<(u64, usize)> {
    let captures = regex::USER_MENTION.captures(content)?;
    let id = captures[1].parse::<u64>().ok()?;
    Some((id, captures[0].len()))
}

/// Pretty-prints a duration as `1h 2m 3s`, omitting zero components.
pub fn format_time(duration: Duration) -> String {
    let total = duration.as_secs();
    if total == 0 {
        return format!("{}ms", duration.as_millis());
    }

    let days = total / 86400;
    let hours = (total % 86400) / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;

    let parts = [(days, "d"), (hours, "h"), (minutes, "m"), (seconds, "s")];

    parts
        .iter()
        .filter(|(amount, _)| *amount > 0)
        .map(|(amount, unit)| format!("{amount}{unit}"))
        .collect::<Vec<_>>()
        .join(" ")
}
