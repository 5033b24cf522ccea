// ── Pointer gestures to device commands ──
//
// The live video is shown scaled on the operator's screen. A pointer
// position is mapped through its fractional position in the surface
// rectangle onto the device's native resolution, then a down/up pair is
// classified as a tap or a swipe by how far the pointer travelled in
// client space.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use devhub_api::DeviceCommand;

use crate::model::{ClientPoint, DevicePoint, Resolution, SurfaceRect};

/// Client-space travel below which a down/up pair is a tap.
pub const TAP_THRESHOLD_PX: f64 = 10.0;

/// Directional swipe length as a fraction of the shorter screen side.
pub const SWIPE_FRACTION: f64 = 0.25;

/// Round half up, the way browser pixel math does.
#[allow(clippy::cast_possible_truncation, clippy::as_conversions)]
fn round_px(v: f64) -> i64 {
    (v + 0.5).floor() as i64
}

// ── GestureIntent ──────────────────────────────────────────────────

/// What the operator meant, in device pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum GestureIntent {
    Tap { at: DevicePoint },
    Swipe { from: DevicePoint, to: DevicePoint },
}

impl GestureIntent {
    pub fn to_command(&self) -> DeviceCommand {
        match *self {
            Self::Tap { at } => DeviceCommand::Tap { x: at.x, y: at.y },
            Self::Swipe { from, to } => DeviceCommand::Swipe {
                x: from.x,
                y: from.y,
                end_x: to.x,
                end_y: to.y,
            },
        }
    }
}

impl fmt::Display for GestureIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tap { at } => write!(f, "tap at {at}"),
            Self::Swipe { from, to } => write!(f, "swipe {from} -> {to}"),
        }
    }
}

/// Classify a down/up pair.
///
/// Pure function of the two client points and [`TAP_THRESHOLD_PX`]. A tap
/// lands where the pointer went down.
pub fn classify(
    start: DevicePoint,
    end: DevicePoint,
    start_client: ClientPoint,
    end_client: ClientPoint,
) -> GestureIntent {
    if start_client.distance_to(end_client) < TAP_THRESHOLD_PX {
        GestureIntent::Tap { at: start }
    } else {
        GestureIntent::Swipe {
            from: start,
            to: end,
        }
    }
}

// ── GestureMapper ──────────────────────────────────────────────────

/// Maps client pixels on the video surface to device pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GestureMapper {
    surface: SurfaceRect,
    resolution: Option<Resolution>,
}

impl GestureMapper {
    pub fn new(surface: SurfaceRect, resolution: Option<Resolution>) -> Self {
        Self {
            surface,
            resolution,
        }
    }

    pub fn surface(&self) -> SurfaceRect {
        self.surface
    }

    pub fn resolution(&self) -> Option<Resolution> {
        self.resolution
    }

    /// Map a client point. Points outside the surface map outside the
    /// screen; nothing is clamped.
    ///
    /// `None` if the resolution is unknown, the surface has no area or the
    /// point is not finite.
    pub fn map_point(&self, client_x: f64, client_y: f64) -> Option<DevicePoint> {
        let resolution = self.resolution?;
        if self.surface.is_degenerate() || !client_x.is_finite() || !client_y.is_finite() {
            return None;
        }
        let fx = (client_x - self.surface.left) / self.surface.width;
        let fy = (client_y - self.surface.top) / self.surface.height;
        Some(DevicePoint {
            x: round_px(fx * f64::from(resolution.width)),
            y: round_px(fy * f64::from(resolution.height)),
        })
    }

    pub fn classify(
        &self,
        start: DevicePoint,
        end: DevicePoint,
        start_client: ClientPoint,
        end_client: ClientPoint,
    ) -> GestureIntent {
        classify(start, end, start_client, end_client)
    }
}

// ── GestureTracker ─────────────────────────────────────────────────

/// Pairs pointer-down with pointer-up.
#[derive(Debug, Clone)]
pub struct GestureTracker {
    mapper: GestureMapper,
    pending: Option<(DevicePoint, ClientPoint)>,
}

impl GestureTracker {
    pub fn new(mapper: GestureMapper) -> Self {
        Self {
            mapper,
            pending: None,
        }
    }

    pub fn mapper(&self) -> &GestureMapper {
        &self.mapper
    }

    /// Replace the mapper (surface resized, resolution learned). Drops any
    /// gesture in progress.
    pub fn set_mapper(&mut self, mapper: GestureMapper) {
        self.mapper = mapper;
        self.pending = None;
    }

    /// Capture the start of a gesture. Returns `false` (and captures
    /// nothing) if the point cannot be mapped.
    pub fn pointer_down(&mut self, client_x: f64, client_y: f64) -> bool {
        match self.mapper.map_point(client_x, client_y) {
            Some(start) => {
                self.pending = Some((start, ClientPoint::new(client_x, client_y)));
                true
            }
            None => false,
        }
    }

    /// Finish a gesture. `None` for an up without a down, or when the end
    /// point cannot be mapped; in the latter case the gesture stays pending
    /// and a later up can still complete it.
    pub fn pointer_up(&mut self, client_x: f64, client_y: f64) -> Option<GestureIntent> {
        let (start, start_client) = self.pending?;
        let end = self.mapper.map_point(client_x, client_y)?;
        self.pending = None;
        Some(classify(
            start,
            end,
            start_client,
            ClientPoint::new(client_x, client_y),
        ))
    }

    pub fn is_tracking(&self) -> bool {
        self.pending.is_some()
    }

    /// Abandon the gesture in progress.
    pub fn cancel(&mut self) {
        self.pending = None;
    }
}

// ── Directional swipes ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Left => "left",
            Self::Right => "right",
        })
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "up" => Ok(Self::Up),
            "down" => Ok(Self::Down),
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            other => Err(format!("unknown direction '{other}' (expected up, down, left or right)")),
        }
    }
}

/// A swipe from the screen center, `round(min(w, h) * 0.25)` pixels long.
pub fn directional_swipe(direction: Direction, resolution: Resolution) -> GestureIntent {
    let width = f64::from(resolution.width);
    let height = f64::from(resolution.height);
    let center = DevicePoint::new(round_px(width / 2.0), round_px(height / 2.0));
    let offset = round_px(width.min(height) * SWIPE_FRACTION);

    let to = match direction {
        Direction::Up => DevicePoint::new(center.x, center.y - offset),
        Direction::Down => DevicePoint::new(center.x, center.y + offset),
        Direction::Left => DevicePoint::new(center.x - offset, center.y),
        Direction::Right => DevicePoint::new(center.x + offset, center.y),
    };
    GestureIntent::Swipe { from: center, to }
}
