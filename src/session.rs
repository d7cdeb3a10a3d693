// =============================================================================
// Session Clock — market-hours filter from feed table to Frame
// =============================================================================
//
// Only rows stamped on the session date and inside [open, close] (inclusive)
// reach the meter pipeline.  Rows whose timestamp is missing or unparseable
// are dropped; they are never assumed to be "today".
//
// The reference date and hours are explicit inputs.  The service derives the
// date from the exchange's UTC offset; tests pass a fixed date.
// =============================================================================

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::feed::{FeedTable, TIMESTAMP_COLUMN};
use crate::frame::Frame;

/// Naive formats accepted for the `Timestamp` column, tried in order.
const TIMESTAMP_FORMATS: [&str; 6] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

fn default_market_open() -> NaiveTime {
    NaiveTime::from_hms_opt(9, 15, 0).unwrap_or_default()
}

fn default_market_close() -> NaiveTime {
    NaiveTime::from_hms_opt(15, 30, 0).unwrap_or_default()
}

fn default_utc_offset_minutes() -> i32 {
    330
}

// =============================================================================
// Configuration
// =============================================================================

/// Market hours and exchange clock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Session open (exchange local time), inclusive.
    #[serde(default = "default_market_open")]
    pub market_open: NaiveTime,

    /// Session close (exchange local time), inclusive.
    #[serde(default = "default_market_close")]
    pub market_close: NaiveTime,

    /// Exchange offset from UTC in minutes (+05:30 = 330).
    #[serde(default = "default_utc_offset_minutes")]
    pub exchange_utc_offset_minutes: i32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            market_open: default_market_open(),
            market_close: default_market_close(),
            exchange_utc_offset_minutes: default_utc_offset_minutes(),
        }
    }
}

impl SessionConfig {
    /// Calendar date on the exchange clock at `now`.
    pub fn exchange_date(&self, now: DateTime<Utc>) -> NaiveDate {
        let offset = FixedOffset::east_opt(self.exchange_utc_offset_minutes * 60)
            .unwrap_or_else(|| {
                warn!(
                    minutes = self.exchange_utc_offset_minutes,
                    "invalid exchange UTC offset, falling back to UTC"
                );
                Utc.fix()
            });
        now.with_timezone(&offset).date_naive()
    }

    /// Session window for `date`.
    pub fn window_for(&self, date: NaiveDate) -> SessionWindow {
        SessionWindow {
            date,
            open: self.market_open,
            close: self.market_close,
        }
    }
}

// =============================================================================
// SessionWindow
// =============================================================================

/// One trading session: a date plus open/close times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionWindow {
    pub date: NaiveDate,
    pub open: NaiveTime,
    pub close: NaiveTime,
}

impl SessionWindow {
    pub fn contains(&self, ts: NaiveDateTime) -> bool {
        ts.date() == self.date && ts.time() >= self.open && ts.time() <= self.close
    }

    /// Build the session Frame from a feed snapshot.
    ///
    /// Every non-timestamp column is carried over (numerically coerced).  Rows
    /// are stably sorted by timestamp so the axis is non-decreasing even if
    /// the feed arrives out of order.
    pub fn filter(&self, table: &FeedTable) -> Frame {
        if !table.has_column(TIMESTAMP_COLUMN) {
            warn!(column = TIMESTAMP_COLUMN, "feed has no timestamp column, session frame is empty");
            return Frame::default();
        }

        let mut kept: Vec<(NaiveDateTime, usize)> = (0..table.row_count())
            .filter_map(|row| {
                let ts = table.cell(row, TIMESTAMP_COLUMN).and_then(parse_timestamp)?;
                self.contains(ts).then_some((ts, row))
            })
            .collect();
        kept.sort_by_key(|(ts, _)| *ts);

        let dropped = table.row_count() - kept.len();
        let mut frame = Frame::new(kept.iter().map(|(ts, _)| *ts).collect());

        for header in table.headers() {
            if header == TIMESTAMP_COLUMN {
                continue;
            }
            let Some(values) = table.numeric_column(header) else {
                continue;
            };
            let selected = kept.iter().map(|(_, row)| values[*row]).collect();
            if let Err(e) = frame.insert_column(header.clone(), selected) {
                warn!(column = %header, error = %e, "skipping feed column");
            }
        }

        debug!(
            date = %self.date,
            kept = frame.len(),
            dropped,
            "session filter applied"
        );

        frame
    }
}

/// Parse a feed timestamp.  RFC 3339 values are taken at their own local
/// clock time (offset discarded); naive formats are taken as exchange time.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_local());
    }

    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn session() -> SessionWindow {
        SessionConfig::default().window_for(NaiveDate::from_ymd_opt(2024, 3, 4).unwrap())
    }

    #[test]
    fn parses_supported_formats() {
        for raw in [
            "2024-03-04 09:15:00",
            "2024-03-04T09:15:00",
            "2024-03-04 09:15",
            "2024-03-04 09:15:00.250",
            "03/04/2024 09:15:00",
            "2024-03-04T09:15:00+05:30",
        ] {
            let ts = parse_timestamp(raw).unwrap_or_else(|| panic!("failed to parse {raw}"));
            assert_eq!(ts.date(), NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());
            assert_eq!(ts.time().format("%H:%M").to_string(), "09:15");
        }
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_timestamp("").is_none());
        assert!(parse_timestamp("yesterday").is_none());
        assert!(parse_timestamp("2024-13-45 99:00:00").is_none());
    }

    #[test]
    fn boundaries_are_inclusive() {
        let s = session();
        let d = s.date;
        assert!(s.contains(d.and_hms_opt(9, 15, 0).unwrap()));
        assert!(s.contains(d.and_hms_opt(15, 30, 0).unwrap()));
        assert!(!s.contains(d.and_hms_opt(9, 14, 59).unwrap()));
        assert!(!s.contains(d.and_hms_opt(15, 30, 1).unwrap()));
        assert!(!s.contains(d.succ_opt().unwrap().and_hms_opt(10, 0, 0).unwrap()));
    }

    #[test]
    fn filter_drops_out_of_session_and_bad_rows() {
        let csv = "\
Timestamp,Nifty_ISS
2024-03-04 09:20:00,0.3
2024-03-04 09:00:00,0.1
not a time,0.9
2024-03-03 10:00:00,0.8
,0.7
2024-03-04 09:16:00,0.2
2024-03-04 16:00:00,0.6
";
        let table = FeedTable::from_csv_str(csv).unwrap();
        let frame = session().filter(&table);
        assert_eq!(frame.len(), 2);
        // Sorted by timestamp.
        assert_eq!(frame.column("Nifty_ISS").unwrap(), &[0.2, 0.3]);
        assert_eq!(frame.timestamps()[0].time(), NaiveTime::from_hms_opt(9, 16, 0).unwrap());
    }

    #[test]
    fn missing_timestamp_column_yields_empty_frame() {
        let table = FeedTable::from_csv_str("Nifty_ISS\n0.5\n").unwrap();
        let frame = session().filter(&table);
        assert!(frame.is_empty());
    }

    #[test]
    fn exchange_date_uses_offset() {
        let cfg = SessionConfig::default();
        // 20:00 UTC is already the next day at +05:30.
        let now = Utc.with_ymd_and_hms(2024, 3, 4, 20, 0, 0).unwrap();
        assert_eq!(cfg.exchange_date(now), NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());
    }

    #[test]
    fn config_defaults_from_empty_json() {
        let cfg: SessionConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.market_open, NaiveTime::from_hms_opt(9, 15, 0).unwrap());
        assert_eq!(cfg.market_close, NaiveTime::from_hms_opt(15, 30, 0).unwrap());
        assert_eq!(cfg.exchange_utc_offset_minutes, 330);
    }
}
