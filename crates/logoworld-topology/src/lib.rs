//! World geometry for LogoWorld.
//!
//! A [`Topology`] owns the integer patch bounds of a world plus one wrap flag per
//! axis and answers every purely geometric question the agent layer asks:
//! coordinate wrapping, wrap-aware distance and bearing, patch addressing,
//! neighbor lookup, candidate windows for radius searches, and diffusion over a
//! flat per-patch buffer. It knows nothing about agents.

mod diffuse;

pub use diffuse::DiffusionKernel;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;
use thiserror::Error;

/// Magnitudes below this are treated as exact zeros by trigonometric helpers.
pub const INFINITESIMAL: f64 = 3.2e-15;

/// Slack added to a radius when deciding whether a patch can hold a turtle in range.
///
/// A turtle may sit anywhere inside its patch, so the patch centre can be up to
/// half a diagonal further away than the turtle itself.
pub const PATCH_DIAGONAL_SLACK: f64 = 1.415;

/// Errors emitted by topology operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TopologyError {
    /// A coordinate lies outside a non-wrapping axis.
    #[error("cannot move beyond the world's edge ({axis} = {coord})")]
    OutOfBounds { axis: Axis, coord: f64 },
    /// A bearing was requested between two identical points.
    #[error("no heading is defined from a point to itself")]
    CoincidentPoints,
    /// Indicates configuration values that cannot be used (e.g., bounds not containing the origin).
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

/// World axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Axis::X => "xcor",
            Axis::Y => "ycor",
            Axis::Z => "zcor",
        };
        f.write_str(name)
    }
}

/// Integer patch bounds of a world, inclusive on both ends.
///
/// A world is three dimensional when `pzcor` is present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldBounds {
    pub min_pxcor: i32,
    pub max_pxcor: i32,
    pub min_pycor: i32,
    pub max_pycor: i32,
    #[serde(default)]
    pub pzcor: Option<(i32, i32)>,
}

impl WorldBounds {
    /// Planar bounds.
    #[must_use]
    pub fn new(min_pxcor: i32, max_pxcor: i32, min_pycor: i32, max_pycor: i32) -> Self {
        Self {
            min_pxcor,
            max_pxcor,
            min_pycor,
            max_pycor,
            pzcor: None,
        }
    }

    /// Volumetric bounds.
    #[must_use]
    pub fn new_3d(
        min_pxcor: i32,
        max_pxcor: i32,
        min_pycor: i32,
        max_pycor: i32,
        min_pzcor: i32,
        max_pzcor: i32,
    ) -> Self {
        Self {
            pzcor: Some((min_pzcor, max_pzcor)),
            ..Self::new(min_pxcor, max_pxcor, min_pycor, max_pycor)
        }
    }

    /// Every axis range must contain the origin.
    pub fn validate(&self) -> Result<(), TopologyError> {
        let mut ranges = vec![
            (self.min_pxcor, self.max_pxcor),
            (self.min_pycor, self.max_pycor),
        ];
        ranges.extend(self.pzcor);
        for (min, max) in ranges {
            if min > max {
                return Err(TopologyError::InvalidConfig(
                    "minimum patch coordinate exceeds maximum",
                ));
            }
            if min > 0 || max < 0 {
                return Err(TopologyError::InvalidConfig(
                    "patch coordinate ranges must contain the origin",
                ));
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn is_3d(&self) -> bool {
        self.pzcor.is_some()
    }

    #[must_use]
    pub fn width(&self) -> i32 {
        self.max_pxcor - self.min_pxcor + 1
    }

    #[must_use]
    pub fn height(&self) -> i32 {
        self.max_pycor - self.min_pycor + 1
    }

    /// Number of patch layers; 1 for planar worlds.
    #[must_use]
    pub fn depth(&self) -> i32 {
        self.pzcor.map_or(1, |(min, max)| max - min + 1)
    }

    #[must_use]
    pub fn min_pzcor(&self) -> i32 {
        self.pzcor.map_or(0, |(min, _)| min)
    }

    #[must_use]
    pub fn max_pzcor(&self) -> i32 {
        self.pzcor.map_or(0, |(_, max)| max)
    }

    /// Total number of patches.
    #[must_use]
    pub fn patch_count(&self) -> usize {
        self.width() as usize * self.height() as usize * self.depth() as usize
    }

    /// Inclusive patch coordinate range of `axis`.
    #[must_use]
    pub fn range(&self, axis: Axis) -> (i32, i32) {
        match axis {
            Axis::X => (self.min_pxcor, self.max_pxcor),
            Axis::Y => (self.min_pycor, self.max_pycor),
            Axis::Z => (self.min_pzcor(), self.max_pzcor()),
        }
    }

    /// Number of patches along `axis`.
    #[must_use]
    pub fn extent(&self, axis: Axis) -> i32 {
        let (min, max) = self.range(axis);
        max - min + 1
    }

    /// Returns true when the patch coordinate lies inside the bounds.
    #[must_use]
    pub fn contains(&self, coord: PatchCoord) -> bool {
        let inside = |axis: Axis, value: i32| {
            let (min, max) = self.range(axis);
            value >= min && value <= max
        };
        inside(Axis::X, coord.x) && inside(Axis::Y, coord.y) && inside(Axis::Z, coord.z)
    }
}

impl Default for WorldBounds {
    fn default() -> Self {
        Self::new(-16, 16, -16, 16)
    }
}

/// Continuous world position. Planar worlds keep `z` at zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point {
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y, z: 0.0 }
    }

    #[must_use]
    pub const fn new_3d(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    #[must_use]
    pub fn coord(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }

    fn with(mut self, axis: Axis, value: f64) -> Self {
        match axis {
            Axis::X => self.x = value,
            Axis::Y => self.y = value,
            Axis::Z => self.z = value,
        }
        self
    }

    /// Straight-line distance ignoring any wrapping.
    #[must_use]
    pub fn distance_unwrapped(&self, other: Point) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        let dz = other.z - self.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

/// Integer patch coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PatchCoord {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl PatchCoord {
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y, z: 0 }
    }

    #[must_use]
    pub const fn new_3d(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Centre of the patch.
    #[must_use]
    pub fn center(&self) -> Point {
        Point::new_3d(f64::from(self.x), f64::from(self.y), f64::from(self.z))
    }
}

impl fmt::Display for PatchCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} {}", self.x, self.y)?;
        if self.z != 0 {
            write!(f, " {}", self.z)?;
        }
        f.write_str(")")
    }
}

/// The world shapes, selected at construction from the wrap flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TopologyKind {
    /// Wraps in x and y.
    Torus,
    /// Wraps in x only.
    VertCylinder,
    /// Wraps in y only.
    HorizCylinder,
    /// Wraps nowhere.
    Box,
    /// Wraps in x, y and z.
    Torus3D,
}

impl TopologyKind {
    /// Planar shape for the given wrap pair.
    #[must_use]
    pub fn from_wraps(wrap_x: bool, wrap_y: bool) -> Self {
        match (wrap_x, wrap_y) {
            (true, true) => TopologyKind::Torus,
            (true, false) => TopologyKind::VertCylinder,
            (false, true) => TopologyKind::HorizCylinder,
            (false, false) => TopologyKind::Box,
        }
    }

    #[must_use]
    pub fn wraps(&self, axis: Axis) -> bool {
        match (self, axis) {
            (TopologyKind::Torus3D, _) => true,
            (_, Axis::Z) => false,
            (TopologyKind::Torus, _) => true,
            (TopologyKind::VertCylinder, Axis::X) => true,
            (TopologyKind::HorizCylinder, Axis::Y) => true,
            _ => false,
        }
    }
}

/// Inclusive patch offset ranges to scan around an origin patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchWindow {
    pub dx: (i32, i32),
    pub dy: (i32, i32),
    pub dz: (i32, i32),
}

/// Wraps `pos` into `[min, max)`.
///
/// Floating error can make the remainder land exactly on `max`; that case
/// collapses to `min`.
#[must_use]
pub fn wrap(pos: f64, min: f64, max: f64) -> f64 {
    if pos >= max {
        let wrapped = min + ((pos - max) % (max - min));
        if wrapped < max { wrapped } else { min }
    } else if pos < min {
        let wrapped = max - ((min - pos) % (max - min));
        if wrapped < max { wrapped } else { min }
    } else {
        pos
    }
}

/// Rounds a continuous coordinate to the patch containing it.
///
/// Halves round towards positive infinity, so `-2.5` belongs to patch `-2`.
#[must_use]
pub fn round_coord(value: f64) -> i32 {
    if value > 0.0 {
        (value + 0.5) as i32
    } else {
        let int_part = value as i32;
        let fract = f64::from(int_part) - value;
        if fract > 0.5 { int_part - 1 } else { int_part }
    }
}

/// Normalizes an angle into `[0, 360)`.
#[must_use]
pub fn normalize_heading(heading: f64) -> f64 {
    if (0.0..360.0).contains(&heading) {
        heading
    } else {
        let normalized = ((heading % 360.0) + 360.0) % 360.0;
        if normalized >= 360.0 { 0.0 } else { normalized }
    }
}

/// Smallest signed turn taking `from` to `to`, in `(-180, 180]`.
#[must_use]
pub fn subtract_headings(to: f64, from: f64) -> f64 {
    let diff = normalize_heading(to) - normalize_heading(from);
    if diff > -180.0 && diff <= 180.0 {
        diff
    } else if diff > 0.0 {
        diff - 360.0
    } else {
        diff + 360.0
    }
}

/// Bearing of the displacement `(dx, dy)`, clockwise from north.
pub fn heading_of(dx: f64, dy: f64) -> Result<f64, TopologyError> {
    if dx == 0.0 && dy == 0.0 {
        return Err(TopologyError::CoincidentPoints);
    }
    if dx == 0.0 {
        return Ok(if dy > 0.0 { 0.0 } else { 180.0 });
    }
    if dy == 0.0 {
        return Ok(if dx > 0.0 { 90.0 } else { 270.0 });
    }
    Ok((270.0 + (PI + (-dy).atan2(dx)).to_degrees()) % 360.0)
}

/// Sine and cosine of a heading with infinitesimal components snapped to zero.
#[must_use]
pub fn heading_components(heading: f64) -> (f64, f64) {
    let radians = heading.to_radians();
    let snap = |v: f64| if v.abs() < INFINITESIMAL { 0.0 } else { v };
    (snap(radians.sin()), snap(radians.cos()))
}

const NEIGHBOR_OFFSETS: [(i32, i32, i32); 8] = [
    (0, 1, 0),
    (1, 0, 0),
    (0, -1, 0),
    (-1, 0, 0),
    (1, 1, 0),
    (1, -1, 0),
    (-1, -1, 0),
    (-1, 1, 0),
];

const NEIGHBOR6_OFFSETS: [(i32, i32, i32); 6] = [
    (0, 1, 0),
    (1, 0, 0),
    (0, -1, 0),
    (-1, 0, 0),
    (0, 0, 1),
    (0, 0, -1),
];

fn neighbor26_offsets() -> Vec<(i32, i32, i32)> {
    let mut offsets = Vec::with_capacity(26);
    for dz in -1..=1 {
        for dy in -1..=1 {
            for dx in -1..=1 {
                if (dx, dy, dz) != (0, 0, 0) {
                    offsets.push((dx, dy, dz));
                }
            }
        }
    }
    offsets
}

/// Geometry of one world.
#[derive(Debug, Clone, PartialEq)]
pub struct Topology {
    kind: TopologyKind,
    bounds: WorldBounds,
}

impl Topology {
    /// Builds the topology for `bounds`; volumetric worlds always wrap on every axis.
    pub fn new(bounds: WorldBounds, wrap_x: bool, wrap_y: bool) -> Result<Self, TopologyError> {
        bounds.validate()?;
        let kind = if bounds.is_3d() {
            TopologyKind::Torus3D
        } else {
            TopologyKind::from_wraps(wrap_x, wrap_y)
        };
        Ok(Self { kind, bounds })
    }

    #[must_use]
    pub fn kind(&self) -> TopologyKind {
        self.kind
    }

    #[must_use]
    pub fn bounds(&self) -> &WorldBounds {
        &self.bounds
    }

    #[must_use]
    pub fn is_3d(&self) -> bool {
        self.bounds.is_3d()
    }

    #[must_use]
    pub fn wraps(&self, axis: Axis) -> bool {
        self.kind.wraps(axis)
    }

    fn axes(&self) -> &'static [Axis] {
        if self.is_3d() {
            &[Axis::X, Axis::Y, Axis::Z]
        } else {
            &[Axis::X, Axis::Y]
        }
    }

    /// Continuous half-open range `[min - 0.5, max + 0.5)` of `axis`.
    #[must_use]
    pub fn continuous_range(&self, axis: Axis) -> (f64, f64) {
        let (min, max) = self.bounds.range(axis);
        (f64::from(min) - 0.5, f64::from(max) + 0.5)
    }

    /// Wraps one coordinate, failing on a non-wrapping axis when it is off-world.
    pub fn wrap_coord(&self, axis: Axis, coord: f64) -> Result<f64, TopologyError> {
        let (low, high) = self.continuous_range(axis);
        if self.wraps(axis) {
            Ok(wrap(coord, low, high))
        } else if coord >= high || coord < low {
            Err(TopologyError::OutOfBounds { axis, coord })
        } else {
            Ok(coord)
        }
    }

    pub fn wrap_x(&self, x: f64) -> Result<f64, TopologyError> {
        self.wrap_coord(Axis::X, x)
    }

    pub fn wrap_y(&self, y: f64) -> Result<f64, TopologyError> {
        self.wrap_coord(Axis::Y, y)
    }

    pub fn wrap_z(&self, z: f64) -> Result<f64, TopologyError> {
        if self.is_3d() {
            self.wrap_coord(Axis::Z, z)
        } else {
            Ok(z)
        }
    }

    /// Wraps every axis of `point`; nothing is returned unless all axes succeed.
    pub fn wrap_point(&self, point: Point) -> Result<Point, TopologyError> {
        Ok(Point::new_3d(
            self.wrap_x(point.x)?,
            self.wrap_y(point.y)?,
            self.wrap_z(point.z)?,
        ))
    }

    fn axis_delta(&self, axis: Axis, from: f64, to: f64) -> f64 {
        let delta = to - from;
        if self.wraps(axis) {
            let half = f64::from(self.bounds.extent(axis)) / 2.0;
            wrap(delta, -half, half)
        } else {
            delta
        }
    }

    /// Shortest displacement from `from` to `to`.
    #[must_use]
    pub fn delta(&self, from: Point, to: Point) -> Point {
        let mut delta = Point::default();
        for &axis in self.axes() {
            delta = delta.with(axis, self.axis_delta(axis, from.coord(axis), to.coord(axis)));
        }
        delta
    }

    /// Wrap-aware distance.
    #[must_use]
    pub fn distance(&self, from: Point, to: Point) -> f64 {
        Point::default().distance_unwrapped(self.delta(from, to))
    }

    /// Distance that wraps only when `wrap` is set.
    #[must_use]
    pub fn distance_with(&self, from: Point, to: Point, wrap: bool) -> f64 {
        if wrap {
            self.distance(from, to)
        } else {
            from.distance_unwrapped(to)
        }
    }

    /// Heading from `from` to `to` along the shortest path.
    pub fn towards(&self, from: Point, to: Point) -> Result<f64, TopologyError> {
        let delta = self.delta(from, to);
        heading_of(delta.x, delta.y)
    }

    /// Heading that wraps only when `wrap` is set.
    pub fn towards_with(&self, from: Point, to: Point, wrap: bool) -> Result<f64, TopologyError> {
        if wrap {
            self.towards(from, to)
        } else {
            heading_of(to.x - from.x, to.y - from.y)
        }
    }

    /// Elevation angle from `from` to `to` in a volumetric world, normalized into `[0, 360)`.
    pub fn towards_pitch(&self, from: Point, to: Point) -> Result<f64, TopologyError> {
        let delta = self.delta(from, to);
        if delta.x == 0.0 && delta.y == 0.0 && delta.z == 0.0 {
            return Err(TopologyError::CoincidentPoints);
        }
        let planar = (delta.x * delta.x + delta.y * delta.y).sqrt();
        Ok(normalize_heading(delta.z.atan2(planar).to_degrees()))
    }

    /// The copy of `to` (possibly off-world) nearest to `from`.
    #[must_use]
    pub fn shortest_path(&self, from: Point, to: Point) -> Point {
        let mut result = to;
        for &axis in self.axes() {
            if !self.wraps(axis) {
                continue;
            }
            let extent = f64::from(self.bounds.extent(axis));
            let (a, b) = (from.coord(axis), to.coord(axis));
            let alternative = if a > b { b + extent } else { b - extent };
            if (b - a).abs() > (alternative - a).abs() {
                result = result.with(axis, alternative);
            }
        }
        result
    }

    /// Patch containing `point`, wrapping it first.
    pub fn patch_coord_at(&self, point: Point) -> Result<PatchCoord, TopologyError> {
        let wrapped = self.wrap_point(point)?;
        let coord = PatchCoord::new_3d(
            round_coord(wrapped.x),
            round_coord(wrapped.y),
            if self.is_3d() { round_coord(wrapped.z) } else { 0 },
        );
        if self.bounds.contains(coord) {
            Ok(coord)
        } else {
            // Rounding just below the top edge can land one patch past it.
            Ok(self.wrap_patch(coord))
        }
    }

    fn wrap_axis_index(&self, axis: Axis, value: i32) -> Option<i32> {
        let (min, max) = self.bounds.range(axis);
        if value >= min && value <= max {
            Some(value)
        } else if self.wraps(axis) {
            Some(min + (value - min).rem_euclid(max - min + 1))
        } else {
            None
        }
    }

    fn wrap_patch(&self, coord: PatchCoord) -> PatchCoord {
        let (min_x, max_x) = self.bounds.range(Axis::X);
        let (min_y, max_y) = self.bounds.range(Axis::Y);
        let (min_z, max_z) = self.bounds.range(Axis::Z);
        PatchCoord::new_3d(
            min_x + (coord.x - min_x).rem_euclid(max_x - min_x + 1),
            min_y + (coord.y - min_y).rem_euclid(max_y - min_y + 1),
            min_z + (coord.z - min_z).rem_euclid(max_z - min_z + 1),
        )
    }

    /// Patch id of an in-bounds coordinate: row-major from the top-left corner, layer by layer.
    #[must_use]
    pub fn patch_index(&self, coord: PatchCoord) -> Option<usize> {
        if !self.bounds.contains(coord) {
            return None;
        }
        Some(self.index_unchecked(coord))
    }

    fn index_unchecked(&self, coord: PatchCoord) -> usize {
        let width = self.bounds.width() as usize;
        let height = self.bounds.height() as usize;
        let layer = (coord.z - self.bounds.min_pzcor()) as usize;
        let row = (self.bounds.max_pycor - coord.y) as usize;
        let column = (coord.x - self.bounds.min_pxcor) as usize;
        layer * width * height + row * width + column
    }

    /// Inverse of [`Topology::patch_index`].
    #[must_use]
    pub fn patch_coord(&self, index: usize) -> Option<PatchCoord> {
        if index >= self.bounds.patch_count() {
            return None;
        }
        Some(self.coord_unchecked(index))
    }

    fn coord_unchecked(&self, index: usize) -> PatchCoord {
        let width = self.bounds.width() as usize;
        let height = self.bounds.height() as usize;
        let layer = index / (width * height);
        let within = index % (width * height);
        PatchCoord::new_3d(
            self.bounds.min_pxcor + (within % width) as i32,
            self.bounds.max_pycor - (within / width) as i32,
            self.bounds.min_pzcor() + layer as i32,
        )
    }

    /// Patch reached from `coord` by an integer offset, wrapping per axis.
    #[must_use]
    pub fn patch_at_offset(&self, coord: PatchCoord, dx: i32, dy: i32, dz: i32) -> Option<PatchCoord> {
        Some(PatchCoord::new_3d(
            self.wrap_axis_index(Axis::X, coord.x + dx)?,
            self.wrap_axis_index(Axis::Y, coord.y + dy)?,
            if self.is_3d() {
                self.wrap_axis_index(Axis::Z, coord.z + dz)?
            } else {
                0
            },
        ))
    }

    #[must_use]
    pub fn north(&self, coord: PatchCoord) -> Option<PatchCoord> {
        self.patch_at_offset(coord, 0, 1, 0)
    }

    #[must_use]
    pub fn east(&self, coord: PatchCoord) -> Option<PatchCoord> {
        self.patch_at_offset(coord, 1, 0, 0)
    }

    #[must_use]
    pub fn south(&self, coord: PatchCoord) -> Option<PatchCoord> {
        self.patch_at_offset(coord, 0, -1, 0)
    }

    #[must_use]
    pub fn west(&self, coord: PatchCoord) -> Option<PatchCoord> {
        self.patch_at_offset(coord, -1, 0, 0)
    }

    #[must_use]
    pub fn north_east(&self, coord: PatchCoord) -> Option<PatchCoord> {
        self.patch_at_offset(coord, 1, 1, 0)
    }

    #[must_use]
    pub fn south_east(&self, coord: PatchCoord) -> Option<PatchCoord> {
        self.patch_at_offset(coord, 1, -1, 0)
    }

    #[must_use]
    pub fn south_west(&self, coord: PatchCoord) -> Option<PatchCoord> {
        self.patch_at_offset(coord, -1, -1, 0)
    }

    #[must_use]
    pub fn north_west(&self, coord: PatchCoord) -> Option<PatchCoord> {
        self.patch_at_offset(coord, -1, 1, 0)
    }

    fn collect_neighbors(&self, coord: PatchCoord, offsets: &[(i32, i32, i32)]) -> Vec<PatchCoord> {
        let mut found = Vec::with_capacity(offsets.len());
        for &(dx, dy, dz) in offsets {
            if let Some(neighbor) = self.patch_at_offset(coord, dx, dy, dz) {
                // Narrow wrapping worlds reach the same patch through several offsets.
                if neighbor != coord && !found.contains(&neighbor) {
                    found.push(neighbor);
                }
            }
        }
        found
    }

    /// The surrounding patches: N, E, S, W, NE, SE, SW, NW in the plane, 26 in a volume.
    #[must_use]
    pub fn neighbors(&self, coord: PatchCoord) -> Vec<PatchCoord> {
        if self.is_3d() {
            self.collect_neighbors(coord, &neighbor26_offsets())
        } else {
            self.collect_neighbors(coord, &NEIGHBOR_OFFSETS)
        }
    }

    /// The face-sharing patches: N, E, S, W in the plane, plus up and down in a volume.
    #[must_use]
    pub fn neighbors4(&self, coord: PatchCoord) -> Vec<PatchCoord> {
        if self.is_3d() {
            self.collect_neighbors(coord, &NEIGHBOR6_OFFSETS)
        } else {
            self.collect_neighbors(coord, &NEIGHBOR_OFFSETS[..4])
        }
    }

    fn axis_window(&self, axis: Axis, start: i32, reach: i32) -> (i32, i32) {
        let (min, max) = self.bounds.range(axis);
        if self.wraps(axis) {
            let extent = f64::from(max - min + 1);
            if f64::from(reach) < extent / 2.0 {
                (-reach, reach)
            } else {
                // Scan each column once even when the radius spans the whole axis.
                (-((extent / 2.0 - 1.0).ceil() as i32), (extent / 2.0).floor() as i32)
            }
        } else {
            let low = min - start;
            let dmin = if low.abs() < reach { low } else { -reach };
            (dmin, (max - start).min(reach))
        }
    }

    /// Candidate patch offsets around `origin` for a search of `radius`.
    #[must_use]
    pub fn search_window(&self, origin: PatchCoord, radius: f64) -> SearchWindow {
        let reach = radius.max(0.0).ceil() as i32;
        SearchWindow {
            dx: self.axis_window(Axis::X, origin.x, reach),
            dy: self.axis_window(Axis::Y, origin.y, reach),
            dz: if self.is_3d() {
                self.axis_window(Axis::Z, origin.z, reach)
            } else {
                (0, 0)
            },
        }
    }

    /// How many times a search of `radius` can wrap around each axis.
    #[must_use]
    pub fn world_copies(&self, radius: f64) -> (i32, i32, i32) {
        let copies = |axis: Axis| {
            if self.wraps(axis) {
                (radius / f64::from(self.bounds.extent(axis))).ceil() as i32
            } else {
                0
            }
        };
        (
            copies(Axis::X),
            copies(Axis::Y),
            if self.is_3d() { copies(Axis::Z) } else { 0 },
        )
    }

    /// Visits every candidate patch of the search window around `origin`
    /// with its distance from `origin`.
    pub fn visit_window(
        &self,
        origin: Point,
        radius: f64,
        wrap: bool,
        visitor: &mut dyn FnMut(PatchCoord, OrderedFloat<f64>),
    ) -> Result<(), TopologyError> {
        let start = self.patch_coord_at(origin)?;
        let window = self.search_window(start, radius);
        for dz in window.dz.0..=window.dz.1 {
            for dy in window.dy.0..=window.dy.1 {
                for dx in window.dx.0..=window.dx.1 {
                    let Some(coord) = self.patch_at_offset(start, dx, dy, dz) else {
                        continue;
                    };
                    let distance = self.distance_with(origin, coord.center(), wrap);
                    visitor(coord, OrderedFloat(distance));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn five_by_five(wrap_x: bool, wrap_y: bool) -> Topology {
        Topology::new(WorldBounds::new(-2, 2, -2, 2), wrap_x, wrap_y).expect("topology")
    }

    #[test]
    fn wrap_stays_in_half_open_range() {
        for step in -400..400 {
            let pos = f64::from(step) * 0.173;
            let wrapped = wrap(pos, -2.5, 2.5);
            assert!((-2.5..2.5).contains(&wrapped), "{pos} wrapped to {wrapped}");
        }
        assert_eq!(wrap(2.5, -2.5, 2.5), -2.5);
        assert_eq!(wrap(-2.5, -2.5, 2.5), -2.5);
        assert_eq!(wrap(7.5, -2.5, 2.5), -2.5);
    }

    #[test]
    fn wrap_collapses_floating_boundary_to_min() {
        let tiny = -1e-17;
        assert_eq!(wrap(tiny, 0.0, 1.0), 0.0);
    }

    #[test]
    fn round_coord_follows_half_up_rule() {
        assert_eq!(round_coord(0.4), 0);
        assert_eq!(round_coord(0.5), 1);
        assert_eq!(round_coord(2.49), 2);
        assert_eq!(round_coord(-0.5), 0);
        assert_eq!(round_coord(-0.51), -1);
        assert_eq!(round_coord(-2.5), -2);
    }

    #[test]
    fn kinds_follow_wrap_flags() {
        assert_eq!(five_by_five(true, true).kind(), TopologyKind::Torus);
        assert_eq!(five_by_five(true, false).kind(), TopologyKind::VertCylinder);
        assert_eq!(five_by_five(false, true).kind(), TopologyKind::HorizCylinder);
        assert_eq!(five_by_five(false, false).kind(), TopologyKind::Box);
        let volume =
            Topology::new(WorldBounds::new_3d(-2, 2, -2, 2, -1, 1), false, false).expect("3d");
        assert_eq!(volume.kind(), TopologyKind::Torus3D);
    }

    #[test]
    fn invalid_bounds_are_rejected() {
        assert!(matches!(
            Topology::new(WorldBounds::new(1, 4, -2, 2), true, true),
            Err(TopologyError::InvalidConfig(_))
        ));
        assert!(matches!(
            Topology::new(WorldBounds::new(2, -2, -2, 2), true, true),
            Err(TopologyError::InvalidConfig(_))
        ));
    }

    #[test]
    fn box_rejects_off_world_coordinates() {
        let topology = five_by_five(false, false);
        assert_eq!(topology.wrap_y(2.49), Ok(2.49));
        assert_eq!(
            topology.wrap_y(2.5),
            Err(TopologyError::OutOfBounds {
                axis: Axis::Y,
                coord: 2.5
            })
        );
        assert!(topology.wrap_x(-2.5).is_ok());
        assert!(topology.wrap_x(-2.51).is_err());
    }

    #[test]
    fn cylinders_wrap_only_one_axis() {
        let vertical = five_by_five(true, false);
        assert_eq!(vertical.wrap_x(3.0), Ok(-2.0));
        assert!(vertical.wrap_y(3.0).is_err());
        let horizontal = five_by_five(false, true);
        assert!(horizontal.wrap_x(3.0).is_err());
        assert_eq!(horizontal.wrap_y(3.0), Ok(-2.0));
    }

    #[test]
    fn patch_index_round_trips_within_bounds() {
        let topology = Topology::new(WorldBounds::new(-3, 4, -2, 5), true, false).expect("topology");
        let bounds = *topology.bounds();
        let mut seen = std::collections::HashSet::new();
        for y in bounds.min_pycor..=bounds.max_pycor {
            for x in bounds.min_pxcor..=bounds.max_pxcor {
                let coord = PatchCoord::new(x, y);
                let index = topology.patch_index(coord).expect("in bounds");
                assert!(seen.insert(index));
                assert_eq!(topology.patch_coord(index), Some(coord));
            }
        }
        assert_eq!(seen.len(), bounds.patch_count());
        assert_eq!(topology.patch_index(PatchCoord::new(-3, 5)), Some(0));
        assert_eq!(topology.patch_index(PatchCoord::new(5, 0)), None);
    }

    #[test]
    fn patch_coord_at_rounds_and_wraps() {
        let torus = five_by_five(true, true);
        assert_eq!(torus.patch_coord_at(Point::new(0.4, -0.6)), Ok(PatchCoord::new(0, -1)));
        assert_eq!(torus.patch_coord_at(Point::new(2.6, 0.0)), Ok(PatchCoord::new(-2, 0)));
        let boxed = five_by_five(false, false);
        assert!(boxed.patch_coord_at(Point::new(2.6, 0.0)).is_err());
    }

    #[test]
    fn distance_and_towards_take_the_short_way_round() {
        let torus = five_by_five(true, true);
        let a = Point::new(-2.0, 0.0);
        let b = Point::new(2.0, 0.0);
        assert!((torus.distance(a, b) - 1.0).abs() < 1e-12);
        assert_eq!(torus.towards(a, b), Ok(270.0));
        let boxed = five_by_five(false, false);
        assert!((boxed.distance(a, b) - 4.0).abs() < 1e-12);
        assert_eq!(boxed.towards(a, b), Ok(90.0));
        assert_eq!(boxed.towards(a, a), Err(TopologyError::CoincidentPoints));
        let diagonal = boxed.towards(Point::new(0.0, 0.0), Point::new(1.0, 1.0)).expect("heading");
        assert!((diagonal - 45.0).abs() < 1e-9);
    }

    #[test]
    fn shortest_path_unwraps_across_the_seam() {
        let torus = five_by_five(true, true);
        let target = torus.shortest_path(Point::new(2.0, 0.0), Point::new(-2.0, 0.0));
        assert_eq!(target, Point::new(3.0, 0.0));
        let boxed = five_by_five(false, false);
        let target = boxed.shortest_path(Point::new(2.0, 0.0), Point::new(-2.0, 0.0));
        assert_eq!(target, Point::new(-2.0, 0.0));
    }

    #[test]
    fn neighbors_respect_edges() {
        let torus = five_by_five(true, true);
        let corner = PatchCoord::new(2, 2);
        assert_eq!(torus.neighbors(corner).len(), 8);
        assert_eq!(torus.neighbors(corner)[0], PatchCoord::new(2, -2));
        assert_eq!(torus.neighbors4(corner).len(), 4);

        let boxed = five_by_five(false, false);
        assert_eq!(boxed.neighbors(corner).len(), 3);
        assert_eq!(boxed.neighbors4(corner).len(), 2);
        assert_eq!(boxed.north(corner), None);
        assert_eq!(boxed.west(corner), Some(PatchCoord::new(1, 2)));

        let cylinder = five_by_five(true, false);
        assert_eq!(cylinder.neighbors(corner).len(), 5);
    }

    #[test]
    fn narrow_torus_neighbors_are_unique() {
        let column = Topology::new(WorldBounds::new(0, 0, -2, 2), true, true).expect("topology");
        let found = column.neighbors(PatchCoord::new(0, 0));
        assert_eq!(found, vec![PatchCoord::new(0, 1), PatchCoord::new(0, -1)]);
        let single = Topology::new(WorldBounds::new(0, 0, 0, 0), true, true).expect("topology");
        assert!(single.neighbors(PatchCoord::new(0, 0)).is_empty());
    }

    #[test]
    fn search_window_uses_half_width_on_wrapping_axes() {
        let torus = five_by_five(true, true);
        let window = torus.search_window(PatchCoord::new(0, 0), 10.0);
        assert_eq!(window.dx, (-2, 2));
        assert_eq!(window.dy, (-2, 2));
        let even = Topology::new(WorldBounds::new(-2, 1, -2, 1), true, true).expect("topology");
        assert_eq!(even.search_window(PatchCoord::new(0, 0), 5.0).dx, (-1, 2));
        let boxed = five_by_five(false, false);
        let window = boxed.search_window(PatchCoord::new(2, -2), 1.5);
        assert_eq!(window.dx, (-2, 0));
        assert_eq!(window.dy, (0, 2));
    }

    #[test]
    fn visit_window_reports_each_patch_once() {
        let torus = five_by_five(true, true);
        let mut visited = Vec::new();
        torus
            .visit_window(Point::new(0.0, 0.0), 20.0, true, &mut |coord, _| visited.push(coord))
            .expect("visit");
        visited.sort();
        visited.dedup();
        assert_eq!(visited.len(), 25);
    }

    #[test]
    fn world_copies_scale_with_radius() {
        let torus = five_by_five(true, true);
        assert_eq!(torus.world_copies(4.0), (1, 1, 0));
        assert_eq!(torus.world_copies(11.0), (3, 3, 0));
        assert_eq!(five_by_five(true, false).world_copies(11.0), (3, 0, 0));
    }

    #[test]
    fn headings_normalize_and_subtract() {
        assert_eq!(normalize_heading(-90.0), 270.0);
        assert_eq!(normalize_heading(720.0), 0.0);
        assert_eq!(subtract_headings(10.0, 350.0), 20.0);
        assert_eq!(subtract_headings(350.0, 10.0), -20.0);
        assert_eq!(subtract_headings(180.0, 0.0), 180.0);
    }
}
