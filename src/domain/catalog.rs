use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Something a customer can book: a one-off event or a recurring tour.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Bookable {
    pub id: Uuid,
    pub kind: BookableKind,
    pub title: String,
    pub slug: String,
    pub currency: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BookableKind {
    Event,
    Tour,
}

impl BookableKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookableKind::Event => "event",
            BookableKind::Tour => "tour",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "event" => Some(BookableKind::Event),
            "tour" => Some(BookableKind::Tour),
            _ => None,
        }
    }
}

/// A dated occurrence of a bookable.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Schedule {
    pub id: Uuid,
    pub bookable_id: Uuid,
    pub starts_at: DateTime<Utc>,
    pub active: bool,
}

impl Schedule {
    pub fn has_started(&self, now: DateTime<Utc>) -> bool {
        self.starts_at <= now
    }
}

/// A pickup location with per-guest pricing. Event pickups belong to one
/// schedule; tour pickups (`schedule_id == None`) apply to every date.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Pickup {
    pub id: Uuid,
    pub bookable_id: Uuid,
    pub schedule_id: Option<Uuid>,
    pub name: String,
    pub adult_price_cents: i64,
    pub child_price_cents: Option<i64>,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PickupTime {
    pub id: Uuid,
    pub pickup_id: Uuid,
    pub label: String,
    pub active: bool,
}

/// The schedule/pickup/time triple a booking (or a proposed edit) points at.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct Selection {
    pub schedule_id: Uuid,
    pub pickup_id: Uuid,
    pub pickup_time_id: Uuid,
}

/// A selection whose references were all found active and consistent with
/// each other at resolution time.
#[derive(Debug, Clone)]
pub struct ResolvedSelection {
    pub bookable: Bookable,
    pub schedule: Schedule,
    pub pickup: Pickup,
    pub pickup_time: PickupTime,
}

impl ResolvedSelection {
    pub fn selection(&self) -> Selection {
        Selection {
            schedule_id: self.schedule.id,
            pickup_id: self.pickup.id,
            pickup_time_id: self.pickup_time.id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBookableRequest {
    pub kind: BookableKind,
    pub title: String,
    pub slug: String,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePickupRequest {
    pub bookable_id: Uuid,
    pub schedule_id: Option<Uuid>,
    pub name: String,
    pub adult_price_cents: i64,
    pub child_price_cents: Option<i64>,
}
