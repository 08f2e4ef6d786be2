//! Persisted punishment records.
//!
//! `StrikeRecord` and `MuteRecord` are append-only: once issued they are
//! never mutated in place, only removed by the expiry sweep or an explicit
//! reversal. Both persist through the tabular record store; timestamps are
//! stored as unix milliseconds so their columns infer as integers.
//!
//! License: MIT OR Apache-2.0

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use chatwarden_store::{Cell, CodecError, TableRecord};

fn millis_cell(row: &[Cell], idx: usize, line: usize, column: &str) -> Result<DateTime<Utc>, CodecError> {
    row[idx]
        .as_int()
        .and_then(DateTime::from_timestamp_millis)
        .ok_or_else(|| CodecError::CellType {
            line,
            column: column.to_string(),
            expected: "unix milliseconds",
        })
}

fn uuid_cell(row: &[Cell], idx: usize, line: usize, column: &str) -> Result<Uuid, CodecError> {
    row[idx].to_text().parse().map_err(|_| CodecError::CellType {
        line,
        column: column.to_string(),
        expected: "uuid",
    })
}

/// One unit of accumulated punishment weight for a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrikeRecord {
    pub id: Uuid,
    pub user_id: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// What earned the strike: a message reference, a moderator command id.
    pub source_ref: String,
}

impl StrikeRecord {
    pub fn issue(user_id: &str, now: DateTime<Utc>, window: Duration, source_ref: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            issued_at: now,
            expires_at: now + window,
            source_ref: source_ref.to_string(),
        }
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

impl TableRecord for StrikeRecord {
    fn columns() -> &'static [&'static str] {
        &["id", "user_id", "issued_at", "expires_at", "source_ref"]
    }

    fn to_row(&self) -> Vec<Cell> {
        vec![
            Cell::text(self.id.to_string()),
            Cell::text(&self.user_id),
            Cell::Int(self.issued_at.timestamp_millis()),
            Cell::Int(self.expires_at.timestamp_millis()),
            Cell::text(&self.source_ref),
        ]
    }

    fn from_row(line: usize, row: &[Cell]) -> Result<Self, CodecError> {
        Ok(Self {
            id: uuid_cell(row, 0, line, "id")?,
            user_id: row[1].to_text(),
            issued_at: millis_cell(row, 2, line, "issued_at")?,
            expires_at: millis_cell(row, 3, line, "expires_at")?,
            source_ref: row[4].to_text(),
        })
    }
}

/// A timed communication restriction, derived automatically whenever a
/// user's accumulated strikes cross a mute threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MuteRecord {
    pub id: Uuid,
    pub user_id: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl MuteRecord {
    pub fn issue(user_id: &str, issued_at: DateTime<Utc>, expires_at: DateTime<Utc>) -> Self {
        Self { id: Uuid::new_v4(), user_id: user_id.to_string(), issued_at, expires_at }
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

impl TableRecord for MuteRecord {
    fn columns() -> &'static [&'static str] {
        &["id", "user_id", "issued_at", "expires_at"]
    }

    fn to_row(&self) -> Vec<Cell> {
        vec![
            Cell::text(self.id.to_string()),
            Cell::text(&self.user_id),
            Cell::Int(self.issued_at.timestamp_millis()),
            Cell::Int(self.expires_at.timestamp_millis()),
        ]
    }

    fn from_row(line: usize, row: &[Cell]) -> Result<Self, CodecError> {
        Ok(Self {
            id: uuid_cell(row, 0, line, "id")?,
            user_id: row[1].to_text(),
            issued_at: millis_cell(row, 2, line, "issued_at")?,
            expires_at: millis_cell(row, 3, line, "expires_at")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatwarden_store::table::{decode_records, encode_records};

    #[test]
    fn strike_records_round_trip_through_the_codec() {
        let now = Utc::now();
        let records = vec![
            StrikeRecord::issue("170915625722576896", now, Duration::hours(504), "msg/1"),
            StrikeRecord::issue("42", now, Duration::hours(504), "mod command"),
        ];
        let decoded: Vec<StrikeRecord> = decode_records(&encode_records(&records)).unwrap();
        // Millisecond precision survives; sub-millisecond does not, so
        // compare at the stored precision.
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].id, records[0].id);
        assert_eq!(decoded[0].user_id, records[0].user_id);
        assert_eq!(
            decoded[0].issued_at.timestamp_millis(),
            records[0].issued_at.timestamp_millis()
        );
        assert_eq!(decoded[1].source_ref, "mod command");
    }

    #[test]
    fn activity_follows_expiry() {
        let now = Utc::now();
        let record = StrikeRecord::issue("u", now, Duration::hours(1), "r");
        assert!(record.is_active(now));
        assert!(record.is_active(now + Duration::minutes(59)));
        assert!(!record.is_active(now + Duration::hours(1)));
    }
}
