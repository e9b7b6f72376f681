//! Entity types and record shapes exchanged with the backing store

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Server-assigned identity of a record
pub type RecordId = i64;

/// The entity collections the fleet application displays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Routes,
    Drivers,
    Vehicles,
}

/// A field on one entity that must name a record of another entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldReference {
    pub field: &'static str,
    pub target: EntityType,
}

/// Local validation rules for an entity type
#[derive(Debug, Clone, Copy)]
pub struct EntitySchema {
    pub required: &'static [&'static str],
    pub references: &'static [FieldReference],
}

const DRIVER_SCHEMA: EntitySchema = EntitySchema {
    required: &["full_name", "license_number"],
    references: &[],
};

const VEHICLE_SCHEMA: EntitySchema = EntitySchema {
    required: &["plate_number", "model"],
    references: &[],
};

const ROUTE_SCHEMA: EntitySchema = EntitySchema {
    required: &["name", "driver_id", "vehicle_id"],
    references: &[
        FieldReference { field: "driver_id", target: EntityType::Drivers },
        FieldReference { field: "vehicle_id", target: EntityType::Vehicles },
    ],
};

impl EntityType {
    pub fn all() -> [EntityType; 3] {
        [EntityType::Routes, EntityType::Drivers, EntityType::Vehicles]
    }

    /// Name used for navigation and as the table name
    pub fn name(&self) -> &'static str {
        match self {
            EntityType::Routes => "routes",
            EntityType::Drivers => "drivers",
            EntityType::Vehicles => "vehicles",
        }
    }

    /// Human title shown in the shell header
    pub fn title(&self) -> &'static str {
        match self {
            EntityType::Routes => "Routes",
            EntityType::Drivers => "Drivers",
            EntityType::Vehicles => "Vehicles",
        }
    }

    pub fn from_name(name: &str) -> Option<EntityType> {
        match name {
            "routes" => Some(EntityType::Routes),
            "drivers" => Some(EntityType::Drivers),
            "vehicles" => Some(EntityType::Vehicles),
            _ => None,
        }
    }

    pub fn schema(&self) -> &'static EntitySchema {
        match self {
            EntityType::Routes => &ROUTE_SCHEMA,
            EntityType::Drivers => &DRIVER_SCHEMA,
            EntityType::Vehicles => &VEHICLE_SCHEMA,
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One row of an entity collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    /// Optimistic concurrency version, bumped by the backend on every update
    #[serde(default = "initial_version")]
    pub version: i64,
    pub data: Value,
}

fn initial_version() -> i64 {
    1
}

impl Record {
    pub fn new(id: RecordId, data: Value) -> Self {
        Self { id, version: initial_version(), data }
    }

    /// Read a field as a record id (accepts integers and numeric strings)
    pub fn reference(&self, field: &str) -> Option<RecordId> {
        reference_value(self.data.get(field)?)
    }
}

pub(crate) fn reference_value(value: &Value) -> Option<RecordId> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// One fetched page together with the collection's current total
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub items: Vec<Record>,
    pub total_count: usize,
}
