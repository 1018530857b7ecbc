use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

/// Fixed cardinality of the intraday chart axis. Every intraday chart gets
/// exactly this many X slots no matter how much real data exists yet, so
/// series render left-aligned instead of rescaling as data trickles in.
pub const GRID_POINTS: usize = 780;

/// Session open, local market time.
pub const SESSION_OPEN_MINUTES: u32 = 9 * 60 + 15;
/// Session close, local market time.
pub const SESSION_CLOSE_MINUTES: u32 = 15 * 60 + 30;

/// Build the fixed intraday time axis for one session date: [`GRID_POINTS`]
/// evenly spaced timestamps from 09:15 to 15:30, strictly increasing.
pub fn session_grid(date: NaiveDate) -> Vec<NaiveDateTime> {
    let open = date.and_time(NaiveTime::MIN) + Duration::minutes(SESSION_OPEN_MINUTES as i64);

    let total_millis = ((SESSION_CLOSE_MINUTES - SESSION_OPEN_MINUTES) as i64) * 60 * 1000;
    let step_millis = total_millis as f64 / GRID_POINTS as f64;

    (0..GRID_POINTS)
        .map(|i| open + Duration::milliseconds((i as f64 * step_millis) as i64))
        .collect()
}

/// Minute-of-day for time-of-day comparisons on the grid.
pub(crate) fn minute_of_day(time: NaiveTime) -> u32 {
    time.hour() * 60 + time.minute()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 2, 20).unwrap()
    }

    #[test]
    fn grid_always_has_exactly_780_points() {
        assert_eq!(session_grid(date()).len(), GRID_POINTS);
    }

    #[test]
    fn grid_is_strictly_increasing() {
        let grid = session_grid(date());
        for pair in grid.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn grid_spans_the_session_window() {
        let grid = session_grid(date());
        let first = grid.first().unwrap();
        let last = grid.last().unwrap();
        assert_eq!(minute_of_day(first.time()), SESSION_OPEN_MINUTES);
        // The last slot lands one step short of the close.
        assert!(minute_of_day(last.time()) < SESSION_CLOSE_MINUTES);
        assert!(minute_of_day(last.time()) >= SESSION_CLOSE_MINUTES - 1);
    }
}
