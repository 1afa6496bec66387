use crate::value::{AgentRef, Value, ValueConstraint};
use logoworld_topology::{Point, WorldBounds, normalize_heading};
use serde::{Deserialize, Serialize};

/// How the observer is looking at the world.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Perspective {
    #[default]
    Observe,
    Watch,
    Follow,
    Ride,
}

/// The singleton observer: holder of the global variables and the camera.
#[derive(Debug, Clone, PartialEq)]
pub struct Observer {
    pub(crate) globals: Vec<Value>,
    pub(crate) constraints: Vec<Option<ValueConstraint>>,
    perspective: Perspective,
    target: Option<AgentRef>,
    position: Point,
    heading: f64,
    pitch: f64,
    roll: f64,
    rotation_point: Point,
}

impl Observer {
    pub(crate) fn new(global_count: usize, bounds: &WorldBounds) -> Self {
        let mut observer = Self {
            globals: vec![Value::default(); global_count],
            constraints: vec![None; global_count],
            perspective: Perspective::Observe,
            target: None,
            position: Point::default(),
            heading: 0.0,
            pitch: 0.0,
            roll: 0.0,
            rotation_point: Point::default(),
        };
        observer.home(bounds);
        observer
    }

    #[must_use]
    pub fn globals(&self) -> &[Value] {
        &self.globals
    }

    #[must_use]
    pub fn constraint(&self, index: usize) -> Option<&ValueConstraint> {
        self.constraints.get(index).and_then(Option::as_ref)
    }

    #[must_use]
    pub fn perspective(&self) -> Perspective {
        self.perspective
    }

    /// Agent being watched, followed or ridden.
    #[must_use]
    pub fn target(&self) -> Option<AgentRef> {
        self.target
    }

    #[must_use]
    pub fn position(&self) -> Point {
        self.position
    }

    #[must_use]
    pub fn heading(&self) -> f64 {
        self.heading
    }

    #[must_use]
    pub fn pitch(&self) -> f64 {
        self.pitch
    }

    #[must_use]
    pub fn roll(&self) -> f64 {
        self.roll
    }

    #[must_use]
    pub fn rotation_point(&self) -> Point {
        self.rotation_point
    }

    pub fn set_orientation(&mut self, heading: f64, pitch: f64, roll: f64) {
        self.heading = normalize_heading(heading);
        self.pitch = normalize_heading(pitch);
        self.roll = normalize_heading(roll);
    }

    pub fn set_position(&mut self, position: Point) {
        self.position = position;
    }

    pub fn set_rotation_point(&mut self, point: Point) {
        self.rotation_point = point;
    }

    /// Centres the camera above the world looking straight down.
    pub fn home(&mut self, bounds: &WorldBounds) {
        let centre = |min: i32, max: i32| f64::from(min) + f64::from(max - min) / 2.0;
        self.position = Point::new_3d(
            centre(bounds.min_pxcor, bounds.max_pxcor),
            centre(bounds.min_pycor, bounds.max_pycor),
            f64::from(bounds.width().max(bounds.height())) * 1.5,
        );
        self.heading = 0.0;
        self.pitch = 90.0;
        self.roll = 0.0;
        self.rotation_point = Point::new(self.position.x, self.position.y);
    }

    pub(crate) fn set_perspective(&mut self, perspective: Perspective, target: Option<AgentRef>) {
        self.perspective = perspective;
        self.target = target;
    }

    pub(crate) fn reset_perspective(&mut self, bounds: &WorldBounds) {
        self.set_perspective(Perspective::Observe, None);
        self.home(bounds);
    }

    /// Offset of the camera from the world centre while following or riding.
    #[must_use]
    pub fn follow_offset(&self, bounds: &WorldBounds) -> (f64, f64) {
        match self.perspective {
            Perspective::Follow | Perspective::Ride => (
                self.position.x
                    - ((f64::from(bounds.min_pxcor) - 0.5) + f64::from(bounds.width()) / 2.0),
                self.position.y
                    - ((f64::from(bounds.min_pycor) - 0.5) + f64::from(bounds.height()) / 2.0),
            ),
            _ => (0.0, 0.0),
        }
    }

    /// Keeps the camera attached to its target after the target moved or turned.
    pub(crate) fn track(&mut self, position: Point, heading: f64, pitch: f64, roll: f64) {
        match self.perspective {
            Perspective::Follow => self.position = position,
            Perspective::Ride => {
                self.position = position;
                self.set_orientation(heading, pitch, roll);
            }
            Perspective::Watch => self.rotation_point = position,
            Perspective::Observe => {}
        }
    }

    /// Straight-line distance from the camera to `point`.
    #[must_use]
    pub fn distance_to(&self, point: Point) -> f64 {
        self.position.distance_unwrapped(point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn home_centres_over_the_world() {
        let bounds = WorldBounds::new(-4, 4, -2, 2);
        let observer = Observer::new(0, &bounds);
        assert_eq!(observer.position(), Point::new_3d(0.0, 0.0, 13.5));
        assert_eq!(observer.pitch(), 90.0);
        assert_eq!(observer.perspective(), Perspective::Observe);
    }

    #[test]
    fn tracking_depends_on_perspective() {
        let bounds = WorldBounds::new(-4, 4, -4, 4);
        let mut observer = Observer::new(0, &bounds);
        observer.set_perspective(Perspective::Ride, Some(AgentRef::Turtle(0)));
        observer.track(Point::new(1.0, 2.0), 370.0, 0.0, 0.0);
        assert_eq!(observer.position(), Point::new(1.0, 2.0));
        assert_eq!(observer.heading(), 10.0);
        assert_eq!(observer.follow_offset(&bounds), (1.0, 2.0));

        observer.reset_perspective(&bounds);
        assert_eq!(observer.target(), None);
        assert_eq!(observer.follow_offset(&bounds), (0.0, 0.0));
    }
}
