//! Time formatting for export audit comments

use chrono::{DateTime, Local};
use std::time::Duration;

/// Timestamp layout used in `Export Started:` / `Export Completed:` comments.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Timestamp layout used in default export file names.
pub const FILE_STAMP_FORMAT: &str = "%Y-%m-%d %H%M%S";

/// Format an elapsed duration as `mm:ss.ss`.
///
/// Minutes are not wrapped into hours, so a 75 minute run reads `75:00.00`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs_f64();
    let minutes = (total / 60.0).floor();
    let seconds = total - minutes * 60.0;
    format!("{:02}:{:05.2}", minutes as u64, seconds)
}

/// Format a wall-clock instant for an audit comment.
pub fn format_timestamp(at: DateTime<Local>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Format a wall-clock instant for use inside a file name.
pub fn file_stamp(at: DateTime<Local>) -> String {
    at.format(FILE_STAMP_FORMAT).to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::from_millis(0)), "00:00.00");
        assert_eq!(format_elapsed(Duration::from_millis(1_500)), "00:01.50");
        assert_eq!(format_elapsed(Duration::from_secs(61)), "01:01.00");
        assert_eq!(format_elapsed(Duration::from_secs(75 * 60)), "75:00.00");
    }

    #[test]
    fn test_timestamps() {
        let at = Local.with_ymd_and_hms(2010, 5, 6, 21, 9, 37).unwrap();
        assert_eq!(format_timestamp(at), "2010-05-06 21:09:37");
        assert_eq!(file_stamp(at), "2010-05-06 210937");
    }
}
