//! Closed vocabularies stored as TEXT columns.
//!
//! Each enum round-trips through a stable snake_case key in the database and
//! in JSON, and renders a human label in pages and reports.

use diesel::backend::Backend;
use diesel::deserialize::{self, FromSql};
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Text;
use diesel::sqlite::Sqlite;
use diesel::{AsExpression, FromSqlRow};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

macro_rules! text_enum_sql {
    ($ty:ident) => {
        impl ToSql<Text, Sqlite> for $ty {
            fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Sqlite>) -> serialize::Result {
                out.set_value(self.as_str());
                Ok(IsNull::No)
            }
        }

        impl FromSql<Text, Sqlite> for $ty {
            fn from_sql(bytes: <Sqlite as Backend>::RawValue<'_>) -> deserialize::Result<Self> {
                let value = <String as FromSql<Text, Sqlite>>::from_sql(bytes)?;
                value
                    .parse()
                    .map_err(|e: String| format!("Unknown {}: {}", stringify!($ty), e).into())
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.label())
            }
        }
    };
}

// ============================================================================
// TICKET STATUS
// ============================================================================

/// Lifecycle state of a ticket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Open,
    InProgress,
    Closed,
    Rejected,
}

impl Default for TicketStatus {
    fn default() -> Self {
        Self::Open
    }
}

impl TicketStatus {
    pub const ALL: [TicketStatus; 4] = [Self::Open, Self::InProgress, Self::Closed, Self::Rejected];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Closed => "closed",
            Self::Rejected => "rejected",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Open => "Open",
            Self::InProgress => "In Progress",
            Self::Closed => "Closed",
            Self::Rejected => "Rejected",
        }
    }
}

impl FromStr for TicketStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(' ', "_").as_str() {
            "open" | "aberto" => Ok(Self::Open),
            "in_progress" | "em_andamento" => Ok(Self::InProgress),
            "closed" | "encerrado" => Ok(Self::Closed),
            "rejected" | "reprovado" => Ok(Self::Rejected),
            _ => Err(s.to_string()),
        }
    }
}

text_enum_sql!(TicketStatus);

// ============================================================================
// CRITICALITY
// ============================================================================

/// Ticket severity
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "snake_case")]
pub enum Criticality {
    Low,
    Medium,
    High,
    Urgent,
}

impl Default for Criticality {
    fn default() -> Self {
        Self::Medium
    }
}

impl Criticality {
    pub const ALL: [Criticality; 4] = [Self::Low, Self::Medium, Self::High, Self::Urgent];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
            Self::Urgent => "Urgent",
        }
    }

    /// Sort rank, Low = 1 through Urgent = 4.
    pub fn rank(&self) -> i32 {
        match self {
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 3,
            Self::Urgent => 4,
        }
    }
}

impl FromStr for Criticality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" | "baixa" => Ok(Self::Low),
            "medium" | "média" | "media" => Ok(Self::Medium),
            "high" | "alta" => Ok(Self::High),
            "urgent" | "urgente" => Ok(Self::Urgent),
            _ => Err(s.to_string()),
        }
    }
}

text_enum_sql!(Criticality);

// ============================================================================
// NOTIFICATION KIND
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    NewTicket,
    Response,
    Closed,
    Rejected,
    StatusChanged,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewTicket => "new_ticket",
            Self::Response => "response",
            Self::Closed => "closed",
            Self::Rejected => "rejected",
            Self::StatusChanged => "status_changed",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::NewTicket => "New ticket",
            Self::Response => "Response",
            Self::Closed => "Closed",
            Self::Rejected => "Rejected",
            Self::StatusChanged => "Status changed",
        }
    }
}

impl FromStr for NotificationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new_ticket" => Ok(Self::NewTicket),
            "response" => Ok(Self::Response),
            "closed" => Ok(Self::Closed),
            "rejected" => Ok(Self::Rejected),
            "status_changed" => Ok(Self::StatusChanged),
            _ => Err(s.to_string()),
        }
    }
}

text_enum_sql!(NotificationKind);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse_accepts_keys_and_labels() {
        assert_eq!("open".parse::<TicketStatus>(), Ok(TicketStatus::Open));
        assert_eq!("In Progress".parse::<TicketStatus>(), Ok(TicketStatus::InProgress));
        assert_eq!("Encerrado".parse::<TicketStatus>(), Ok(TicketStatus::Closed));
        assert!("archived".parse::<TicketStatus>().is_err());
    }

    #[test]
    fn test_status_round_trip_through_key() {
        for status in TicketStatus::ALL {
            assert_eq!(status.as_str().parse::<TicketStatus>(), Ok(status));
        }
    }

    #[test]
    fn test_criticality_rank_order() {
        let ranks: Vec<i32> = Criticality::ALL.iter().map(Criticality::rank).collect();
        assert_eq!(ranks, vec![1, 2, 3, 4]);
        assert!(Criticality::Urgent > Criticality::Low);
        assert_eq!(Criticality::default(), Criticality::Medium);
    }

    #[test]
    fn test_serde_uses_snake_case_keys() {
        let json = serde_json::to_string(&TicketStatus::InProgress).expect("serialize");
        assert_eq!(json, "\"in_progress\"");
        let parsed: Criticality = serde_json::from_str("\"urgent\"").expect("deserialize");
        assert_eq!(parsed, Criticality::Urgent);
    }
}
