use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;

use super::{MapSurface, Shape, ShapeHandle, ShapeStyle};
use crate::assignment::AssignmentPolicy;
use crate::geo::{build_circle_polygon, display_circle, GeoError, LatLng};
use crate::lifecycle::current_duties;
use crate::resolver::resolve;
use crate::utils::{Duty, DutyStatus, DutyType, Officer};

const UNKNOWN: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerLabel {
    pub duty_id: String,
    pub officer: String,
    pub designation: String,
    pub staff_id: String,
    pub duty_type: String,
    pub status: String,
    pub status_color: &'static str,
    pub assigned: String,
}

impl MarkerLabel {
    pub fn for_duty(duty: &Duty, roster: &[Officer], offset: FixedOffset) -> Self {
        let summary = resolve(&duty.officer_ids, roster);

        let status_color = match &duty.status {
            Some(status) if status.is_terminal() => "#22c55e",
            Some(DutyStatus::Incomplete) => "#ef4444",
            _ => "#f59e0b",
        };

        Self {
            duty_id: duty.id.clone(),
            officer: summary.name,
            designation: summary.designation,
            staff_id: summary.staff_id,
            duty_type: duty
                .duty_type
                .map(|t| t.as_str().to_uppercase())
                .unwrap_or_else(|| UNKNOWN.to_string()),
            status: duty
                .status
                .as_ref()
                .map(|s| s.as_str().to_string())
                .unwrap_or_else(|| UNKNOWN.to_string()),
            status_color,
            assigned: duty
                .assigned_at
                .map(|at| format_local(at, offset))
                .unwrap_or_else(|| UNKNOWN.to_string()),
        }
    }
}

/// `01/06/2024, 6:00:00 pm` at `offset`.
pub fn format_local(at: DateTime<Utc>, offset: FixedOffset) -> String {
    at.with_timezone(&offset)
        .format("%d/%m/%Y, %-I:%M:%S %P")
        .to_string()
}

/// Draws the displayable duties: a marker at each geofence centroid and a
/// circle of the geofence's effective radius.
pub struct DutyOverlay {
    minimum_radius_m: f64,
    utc_offset: FixedOffset,
    handles: Vec<ShapeHandle>,
}

impl DutyOverlay {
    pub fn new(minimum_radius_m: f64, utc_offset: FixedOffset) -> Self {
        Self {
            minimum_radius_m,
            utc_offset,
            handles: Vec::new(),
        }
    }

    pub fn shape_count(&self) -> usize {
        self.handles.len()
    }

    /// Replaces whatever the previous render drew. Returns the centroids of
    /// the duties drawn, for fitting the view.
    pub fn render<M>(&mut self, surface: &mut M, duties: &[Duty], roster: &[Officer], now: DateTime<Utc>) -> Vec<LatLng>
    where
        M: MapSurface + ?Sized,
    {
        self.clear(surface);

        let mut centers = Vec::new();
        for duty in current_duties(duties, now) {
            let Some((center, radius_m)) = display_circle(&duty.area, self.minimum_radius_m) else {
                continue;
            };

            let label = MarkerLabel::for_duty(duty, roster, self.utc_offset);
            self.handles
                .push(surface.add_shape(Shape::Marker { at: center, label }, ShapeStyle::marker()));

            // Duties of an unrecognised type get a marker but no geofence.
            if let Some(duty_type) = duty.duty_type {
                self.handles.push(
                    surface.add_shape(Shape::Circle { center, radius_m }, ShapeStyle::duty(duty_type)),
                );
            }

            centers.push(center);
        }

        centers
    }

    pub fn clear<M>(&mut self, surface: &mut M)
    where
        M: MapSurface + ?Sized,
    {
        for handle in self.handles.drain(..) {
            surface.remove_shape(handle);
        }
    }
}

/// The geofence a dispatcher is placing: a clicked center, a radius and a
/// duty type, previewed on the map until the duty is submitted.
pub struct AssignmentDraft {
    policy: AssignmentPolicy,
    center: Option<LatLng>,
    radius_m: f64,
    duty_type: Option<DutyType>,
    preview: Option<ShapeHandle>,
}

impl AssignmentDraft {
    pub fn new(policy: AssignmentPolicy) -> Self {
        let radius_m = policy.radius(None);
        Self {
            policy,
            center: None,
            radius_m,
            duty_type: None,
            preview: None,
        }
    }

    pub fn center(&self) -> Option<LatLng> {
        self.center
    }

    pub fn radius_m(&self) -> f64 {
        self.radius_m
    }

    pub fn select(&mut self, point: LatLng) {
        self.center = Some(point);
    }

    /// Sets the radius, clamped to the policy minimum.
    pub fn set_radius(&mut self, radius_m: f64) {
        self.radius_m = self.policy.radius(Some(radius_m));
    }

    pub fn set_duty_type(&mut self, duty_type: DutyType) {
        self.duty_type = Some(duty_type);
    }

    /// The polygon that would be stored, once a center has been picked.
    pub fn polygon(&self) -> Result<Option<Vec<LatLng>>, GeoError> {
        self.center
            .map(|center| build_circle_polygon(center, self.radius_m, self.policy.sides))
            .transpose()
    }

    /// Redraws the preview circle. Nothing is drawn until both a duty type
    /// and a center are known.
    pub fn redraw<M>(&mut self, surface: &mut M)
    where
        M: MapSurface + ?Sized,
    {
        if let Some(handle) = self.preview.take() {
            surface.remove_shape(handle);
        }

        if let (Some(center), Some(duty_type)) = (self.center, self.duty_type) {
            let shape = Shape::Circle {
                center,
                radius_m: self.radius_m,
            };
            self.preview = Some(surface.add_shape(shape, ShapeStyle::draft(duty_type)));
        }
    }

    pub fn reset<M>(&mut self, surface: &mut M)
    where
        M: MapSurface + ?Sized,
    {
        if let Some(handle) = self.preview.take() {
            surface.remove_shape(handle);
        }
        self.center = None;
        self.duty_type = None;
        self.radius_m = self.policy.radius(None);
    }
}
