//! [`MapSurface`] is what the overlay draws on. [`ShapeBuffer`] is the
//! in-process surface: it records shapes and the viewport so they can be
//! served as JSON to whichever client actually paints the tiles.

use serde::Serialize;
use std::collections::BTreeMap;

pub mod overlay;

pub use overlay::{AssignmentDraft, DutyOverlay, MarkerLabel};

use crate::geo::{bounds, Bounds, LatLng};
use crate::utils::DutyType;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Shape {
    Marker { at: LatLng, label: MarkerLabel },
    #[serde(rename_all = "camelCase")]
    Circle { center: LatLng, radius_m: f64 },
    Polygon { points: Vec<LatLng> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShapeStyle {
    pub color: &'static str,
    pub fill_color: &'static str,
    pub fill_opacity: f64,
    pub weight: u8,
}

impl ShapeStyle {
    /// Geofence style for a stored duty.
    pub fn duty(duty_type: DutyType) -> Self {
        let color = match duty_type {
            DutyType::Naka => "#22c55e",
            DutyType::Patrol => "#3b82f6",
        };
        Self {
            color,
            fill_color: color,
            fill_opacity: 0.1,
            weight: 1,
        }
    }

    /// Heavier style for the geofence being drawn during assignment.
    pub fn draft(duty_type: DutyType) -> Self {
        let color = match duty_type {
            DutyType::Naka => "#16a34a",
            DutyType::Patrol => "#2563eb",
        };
        Self {
            color,
            fill_color: color,
            fill_opacity: 0.3,
            weight: 3,
        }
    }

    pub fn marker() -> Self {
        Self {
            color: "#333333",
            fill_color: "#ffffff",
            fill_opacity: 1.0,
            weight: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ShapeHandle(u64);

pub type ClickHandler = Box<dyn FnMut(LatLng) + Send>;

pub trait MapSurface {
    fn add_shape(&mut self, shape: Shape, style: ShapeStyle) -> ShapeHandle;

    /// Removing a handle that is not on the surface is a no-op.
    fn remove_shape(&mut self, handle: ShapeHandle);

    fn on_click(&mut self, handler: ClickHandler);

    fn fit_to_bounds(&mut self, points: &[LatLng]);

    fn focus(&mut self, point: LatLng, zoom: u8);
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacedShape {
    pub id: ShapeHandle,
    #[serde(flatten)]
    pub shape: Shape,
    pub style: ShapeStyle,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewport {
    pub center: LatLng,
    pub zoom: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounds: Option<Bounds>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapScene {
    pub viewport: Viewport,
    pub shapes: Vec<PlacedShape>,
}

pub struct ShapeBuffer {
    next_id: u64,
    shapes: BTreeMap<ShapeHandle, PlacedShape>,
    viewport: Viewport,
    click_handlers: Vec<ClickHandler>,
}

impl ShapeBuffer {
    pub fn new(center: LatLng, zoom: u8) -> Self {
        Self {
            next_id: 1,
            shapes: BTreeMap::new(),
            viewport: Viewport {
                center,
                zoom,
                bounds: None,
            },
            click_handlers: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    pub fn shapes(&self) -> impl Iterator<Item = &PlacedShape> {
        self.shapes.values()
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    /// Delivers a click at `point` to every registered handler.
    pub fn click(&mut self, point: LatLng) {
        for handler in self.click_handlers.iter_mut() {
            handler(point);
        }
    }

    pub fn scene(&self) -> MapScene {
        MapScene {
            viewport: self.viewport.clone(),
            shapes: self.shapes.values().cloned().collect(),
        }
    }
}

impl MapSurface for ShapeBuffer {
    fn add_shape(&mut self, shape: Shape, style: ShapeStyle) -> ShapeHandle {
        let id = ShapeHandle(self.next_id);
        self.next_id += 1;
        self.shapes.insert(id, PlacedShape { id, shape, style });
        id
    }

    fn remove_shape(&mut self, handle: ShapeHandle) {
        self.shapes.remove(&handle);
    }

    fn on_click(&mut self, handler: ClickHandler) {
        self.click_handlers.push(handler);
    }

    fn fit_to_bounds(&mut self, points: &[LatLng]) {
        if let Some(area) = bounds(points) {
            self.viewport.center = LatLng::new(
                (area.south_west.lat + area.north_east.lat) / 2.0,
                (area.south_west.lng + area.north_east.lng) / 2.0,
            );
            self.viewport.bounds = Some(area);
        }
    }

    fn focus(&mut self, point: LatLng, zoom: u8) {
        self.viewport = Viewport {
            center: point,
            zoom,
            bounds: None,
        };
    }
}
