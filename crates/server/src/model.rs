// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scene data model: objects, their transforms and per-kind properties, and
//! the users collaborating on a session.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Position, Euler rotation (radians), and scale of an object in scene space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: [f64; 3],
    pub rotation: [f64; 3],
    pub scale: [f64; 3],
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: [0.0, 0.0, 0.0],
            rotation: [0.0, 0.0, 0.0],
            scale: [1.0, 1.0, 1.0],
        }
    }
}

/// The kind of an object, determining which `Properties` variant is valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Cube,
    Sphere,
    Cylinder,
    Camera,
    PointLight,
    SunLight,
    AssetRef,
}

/// Per-kind properties. The active variant must match the owning object's
/// `kind` (enforced at construction and by every mutating transition in
/// `session_state`). Primitives and asset references carry no properties
/// beyond their shared object fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Properties {
    Cube,
    Sphere,
    Cylinder,
    Camera {
        focal_length_mm: f64,
        sensor_width_mm: f64,
        clip_start: f64,
        clip_end: f64,
    },
    PointLight {
        color_rgb: [f64; 3],
        power_watts: f64,
        radius: f64,
    },
    SunLight {
        color_rgb: [f64; 3],
        intensity: f64,
        angle_rad: f64,
    },
    AssetRef,
}

impl Properties {
    pub fn kind(&self) -> ObjectKind {
        match self {
            Self::Cube => ObjectKind::Cube,
            Self::Sphere => ObjectKind::Sphere,
            Self::Cylinder => ObjectKind::Cylinder,
            Self::Camera { .. } => ObjectKind::Camera,
            Self::PointLight { .. } => ObjectKind::PointLight,
            Self::SunLight { .. } => ObjectKind::SunLight,
            Self::AssetRef => ObjectKind::AssetRef,
        }
    }

    pub fn matches_kind(&self, kind: ObjectKind) -> bool {
        self.kind() == kind
    }

    /// The per-kind numeric ranges fixed by the data model: camera lens
    /// fields strictly positive, light colors in `[0,1]`, light power/
    /// radius/intensity non-negative, sun angle in `[0, π]`. Primitives
    /// and asset references carry no fields to validate.
    pub fn within_declared_bounds(&self) -> bool {
        fn in_unit_interval(v: f64) -> bool {
            (0.0..=1.0).contains(&v)
        }
        match self {
            Self::Cube | Self::Sphere | Self::Cylinder | Self::AssetRef => true,
            Self::Camera {
                focal_length_mm,
                sensor_width_mm,
                clip_start,
                clip_end,
            } => {
                *focal_length_mm > 0.0
                    && *sensor_width_mm > 0.0
                    && *clip_start > 0.0
                    && *clip_end > 0.0
            }
            Self::PointLight {
                color_rgb,
                power_watts,
                radius,
            } => color_rgb.iter().all(|c| in_unit_interval(*c)) && *power_watts >= 0.0 && *radius >= 0.0,
            Self::SunLight {
                color_rgb,
                intensity,
                angle_rad,
            } => {
                color_rgb.iter().all(|c| in_unit_interval(*c))
                    && *intensity >= 0.0
                    && (0.0..=std::f64::consts::PI).contains(angle_rad)
            }
        }
    }
}

/// A single object in a collaborative scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Object {
    pub id: Uuid,
    pub name: String,
    pub kind: ObjectKind,
    /// Non-null iff `kind == AssetRef` (invariant 3).
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub asset_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub asset_library: Option<String>,
    pub transform: Transform,
    pub properties: Properties,
    pub created_by: String,
    pub last_updated_by: String,
    /// Milliseconds since epoch, already clamped for clock skew.
    pub created_at: i64,
    pub last_updated_at: i64,
}

impl Object {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: Uuid,
        name: String,
        properties: Properties,
        asset_id: Option<String>,
        asset_library: Option<String>,
        transform: Transform,
        created_at: i64,
        created_by: String,
    ) -> Self {
        let kind = properties.kind();
        Self {
            id,
            name,
            kind,
            asset_id,
            asset_library,
            transform,
            properties,
            created_by: created_by.clone(),
            last_updated_by: created_by,
            created_at,
            last_updated_at: created_at,
        }
    }
}

/// A connected collaborator. `user_id` is supplied by the client on
/// `JOIN_SESSION` and must be unique within a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub user_id: String,
    pub display_name: String,
    pub color_rgb: [f64; 3],
    pub selected_object: Option<Uuid>,
    pub connected_at: i64,
    /// Monotonic join order within the session; never decreases on
    /// reconnect and determines this user's color via `palette[seat_index
    /// % palette.len()]`. Internal bookkeeping, not part of the wire shape.
    #[serde(skip)]
    pub seat_index: u64,
}

#[cfg(test)]
#[path = "model_tests.rs"]
mod tests;
