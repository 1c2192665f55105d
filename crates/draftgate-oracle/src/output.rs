use draftgate_core::QualityScore;

use crate::OracleError;

/// Extract the score from oracle stdout.
///
/// The first line containing `marker` wins. The value after it is a
/// percentage in `0..=100`, optionally written as `92%` or `92/100`.
pub fn parse_score_output(output: &str, marker: &str) -> Result<QualityScore, OracleError> {
    let rest = output
        .lines()
        .find_map(|line| line.find(marker).map(|at| &line[at + marker.len()..]))
        .ok_or_else(|| OracleError::MarkerMissing {
            marker: marker.to_string(),
        })?;

    // Tolerate markdown emphasis around the marker, e.g. "**Quality Score:** 92%".
    let token = rest
        .trim_start_matches(|c: char| c.is_whitespace() || c == '*')
        .split_whitespace()
        .next()
        .unwrap_or_default();

    let number = token.trim_end_matches([',', ';', '.']).trim_end_matches('%');
    let number = number.strip_suffix("/100").unwrap_or(number);
    let value: f64 = number
        .parse()
        .map_err(|_| OracleError::InvalidValue(token.to_string()))?;

    QualityScore::from_percentage(value).ok_or(OracleError::OutOfRange(value))
}
