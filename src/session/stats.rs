use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::persistence::CompletedSession;

/// Totals over the session history
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    /// Number of completed sessions
    pub total_sessions: usize,

    /// Total focused time in seconds
    pub total_duration_secs: f64,

    /// Longest single session in seconds
    pub longest_session_secs: f64,

    /// When the first session was recorded
    pub first_session_at: Option<DateTime<Utc>>,

    /// When the most recent session was recorded
    pub last_session_at: Option<DateTime<Utc>>,

    /// Per-day totals, oldest day first
    pub daily: Vec<DailyTotal>,
}

/// Sessions completed on one calendar day (UTC)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyTotal {
    pub date: NaiveDate,
    pub sessions: usize,
    pub duration_secs: f64,
}

impl SessionStats {
    pub fn from_sessions(sessions: &[CompletedSession]) -> Self {
        let mut days: BTreeMap<NaiveDate, DailyTotal> = BTreeMap::new();
        let mut stats = SessionStats::default();

        for session in sessions {
            stats.total_sessions += 1;
            stats.total_duration_secs += session.duration_secs;
            stats.longest_session_secs = stats.longest_session_secs.max(session.duration_secs);
            stats.first_session_at = Some(match stats.first_session_at {
                Some(first) => first.min(session.date),
                None => session.date,
            });
            stats.last_session_at = Some(match stats.last_session_at {
                Some(last) => last.max(session.date),
                None => session.date,
            });

            let date = session.date.date_naive();
            let day = days.entry(date).or_insert(DailyTotal {
                date,
                sessions: 0,
                duration_secs: 0.0,
            });
            day.sessions += 1;
            day.duration_secs += session.duration_secs;
        }

        stats.daily = days.into_values().collect();
        stats
    }

    pub fn total_minutes(&self) -> f64 {
        self.total_duration_secs / 60.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::Duration;

    #[test]
    fn test_empty_history() {
        let stats = SessionStats::from_sessions(&[]);
        assert_eq!(stats.total_sessions, 0);
        assert!(stats.daily.is_empty());
        assert!(stats.first_session_at.is_none());
    }

    #[test]
    fn test_totals_and_days() {
        let day1 = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();
        let day1_late = Utc.with_ymd_and_hms(2026, 3, 1, 21, 30, 0).unwrap();
        let day2 = Utc.with_ymd_and_hms(2026, 3, 2, 7, 0, 0).unwrap();

        let sessions = vec![
            CompletedSession::new(Duration::from_secs(600), day1_late),
            CompletedSession::new(Duration::from_secs(300), day1),
            CompletedSession::new(Duration::from_secs(1200), day2),
        ];
        let stats = SessionStats::from_sessions(&sessions);

        assert_eq!(stats.total_sessions, 3);
        assert!((stats.total_minutes() - 35.0).abs() < 1e-9);
        assert!((stats.longest_session_secs - 1200.0).abs() < 1e-9);
        assert_eq!(stats.first_session_at, Some(day1));
        assert_eq!(stats.last_session_at, Some(day2));

        assert_eq!(stats.daily.len(), 2);
        assert_eq!(stats.daily[0].sessions, 2);
        assert!((stats.daily[0].duration_secs - 900.0).abs() < 1e-9);
        assert_eq!(stats.daily[1].date, day2.date_naive());
    }
}
