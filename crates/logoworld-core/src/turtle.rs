use crate::drawing::{DrawingLine, PenMode};
use crate::error::AgentError;
use crate::patch::DEFAULT_LABEL_COLOR;
use crate::program::{Remap, TURTLES};
use crate::ties::Orientation;
use crate::value::{AgentKind, AgentRef, DEAD_ID, Value};
use crate::world::World;
use logoworld_topology::{Point, TopologyError, heading_components, normalize_heading};
use rand::Rng;
use std::collections::BTreeSet;
use tracing::debug;

/// Number of base hues in the colour wheel; base colour `i` is `5 + 10 * i`.
pub const BASE_COLOR_COUNT: u32 = 14;

#[must_use]
pub fn base_color(index: u32) -> f64 {
    5.0 + 10.0 * f64::from(index % BASE_COLOR_COUNT)
}

/// A mobile agent.
#[derive(Debug, Clone, PartialEq)]
pub struct Turtle {
    pub(crate) id: i64,
    pub(crate) position: Point,
    pub(crate) heading: f64,
    pub(crate) pitch: f64,
    pub(crate) roll: f64,
    pub(crate) color: Value,
    pub(crate) shape: String,
    pub(crate) label: Value,
    pub(crate) label_color: Value,
    pub(crate) breed: String,
    pub(crate) hidden: bool,
    pub(crate) size: f64,
    pub(crate) pen_size: f64,
    pub(crate) pen_mode: PenMode,
    pub(crate) vars: Vec<Value>,
    pub(crate) patch_here: usize,
    pub(crate) links: BTreeSet<i64>,
}

impl Turtle {
    fn new(id: i64, breed: &str, position: Point, patch_here: usize, own_count: usize) -> Self {
        Self {
            id,
            position,
            heading: 0.0,
            pitch: 0.0,
            roll: 0.0,
            color: Value::Number(0.0),
            shape: "default".to_owned(),
            label: Value::Str(String::new()),
            label_color: Value::Number(DEFAULT_LABEL_COLOR),
            breed: breed.to_owned(),
            hidden: false,
            size: 1.0,
            pen_size: 1.0,
            pen_mode: PenMode::Up,
            vars: vec![Value::default(); own_count],
            patch_here,
            links: BTreeSet::new(),
        }
    }

    /// Identity; `-1` once the turtle has died.
    #[must_use]
    pub fn id(&self) -> i64 {
        self.id
    }

    #[must_use]
    pub fn position(&self) -> Point {
        self.position
    }

    #[must_use]
    pub fn xcor(&self) -> f64 {
        self.position.x
    }

    #[must_use]
    pub fn ycor(&self) -> f64 {
        self.position.y
    }

    #[must_use]
    pub fn zcor(&self) -> f64 {
        self.position.z
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
    pub fn color(&self) -> &Value {
        &self.color
    }

    #[must_use]
    pub fn shape(&self) -> &str {
        &self.shape
    }

    #[must_use]
    pub fn label(&self) -> &Value {
        &self.label
    }

    #[must_use]
    pub fn label_color(&self) -> &Value {
        &self.label_color
    }

    /// Upper-case breed name; `TURTLES` for unbred turtles.
    #[must_use]
    pub fn breed(&self) -> &str {
        &self.breed
    }

    #[must_use]
    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    #[must_use]
    pub fn size(&self) -> f64 {
        self.size
    }

    #[must_use]
    pub fn pen_size(&self) -> f64 {
        self.pen_size
    }

    #[must_use]
    pub fn pen_mode(&self) -> PenMode {
        self.pen_mode
    }

    /// Declared variables of the turtle's breed, in layout order.
    #[must_use]
    pub fn vars(&self) -> &[Value] {
        &self.vars
    }

    /// Id of the patch under the turtle.
    #[must_use]
    pub fn patch_here(&self) -> usize {
        self.patch_here
    }

    /// Ids of the links attached to this turtle.
    pub fn link_ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.links.iter().copied()
    }

    pub(crate) fn orientation(&self) -> Orientation {
        Orientation {
            heading: self.heading,
            pitch: self.pitch,
            roll: self.roll,
        }
    }

    /// Unit vector along the turtle's heading (and pitch, in volumetric worlds).
    fn direction(&self, volumetric: bool) -> Point {
        let (sin_h, cos_h) = heading_components(self.heading);
        if volumetric {
            let (sin_p, cos_p) = heading_components(self.pitch);
            Point::new_3d(cos_p * sin_h, cos_p * cos_h, sin_p)
        } else {
            Point::new(sin_h, cos_h)
        }
    }
}

fn offset(point: Point, direction: Point, distance: f64) -> Point {
    Point::new_3d(
        point.x + direction.x * distance,
        point.y + direction.y * distance,
        point.z + direction.z * distance,
    )
}

fn is_out_of_bounds(err: &AgentError) -> bool {
    matches!(err, AgentError::Topology(TopologyError::OutOfBounds { .. }))
}

impl World {
    fn resolve_turtle_breed(&self, breed: &str) -> Result<(String, usize), AgentError> {
        let upper = breed.to_uppercase();
        let layout = self
            .schema
            .turtles(&upper)
            .ok_or_else(|| AgentError::NoSuchBreed(upper.clone()))?;
        Ok((upper, layout.own_count()))
    }

    fn register_turtle(&mut self, turtle: Turtle) -> Result<i64, AgentError> {
        let id = turtle.id;
        if self.turtles.contains_key(&id) {
            return Err(AgentError::Corrupted(format!("turtle {id} registered twice")));
        }
        if let Some(set) = self.turtle_breeds.get_mut(&turtle.breed) {
            set.insert(id)?;
        }
        let patch = self
            .patches
            .get_mut(turtle.patch_here)
            .ok_or_else(|| AgentError::Corrupted(format!("turtle {id} placed off the grid")))?;
        patch.turtles_here.push(id);
        self.turtles.insert(id, turtle);
        self.next_turtle_id = self.next_turtle_id.max(id + 1);
        self.dirty = true;
        Ok(id)
    }

    fn spawn_turtle(
        &mut self,
        breed: &str,
        position: Point,
        heading: f64,
        color: f64,
    ) -> Result<i64, AgentError> {
        let (breed, own_count) = self.resolve_turtle_breed(breed)?;
        let position = self.topology.wrap_point(position)?;
        let patch_here = self.patch_at_point(position)?;
        let mut turtle = Turtle::new(self.next_turtle_id, &breed, position, patch_here, own_count);
        turtle.heading = normalize_heading(heading);
        turtle.color = Value::Number(color);
        self.register_turtle(turtle)
    }

    /// Creates `n` turtles at the origin with random base colours and whole-degree headings.
    pub fn create_turtles(&mut self, n: usize, breed: &str) -> Result<Vec<i64>, AgentError> {
        let mut created = Vec::with_capacity(n);
        for _ in 0..n {
            let color = base_color(self.rng().random_range(0..BASE_COLOR_COUNT));
            let heading = f64::from(self.rng().random_range(0..360_u32));
            created.push(self.spawn_turtle(breed, Point::default(), heading, color)?);
        }
        Ok(created)
    }

    /// Creates `n` turtles at the origin with evenly spread headings and cycling colours.
    pub fn create_ordered_turtles(&mut self, n: usize, breed: &str) -> Result<Vec<i64>, AgentError> {
        let mut created = Vec::with_capacity(n);
        for i in 0..n {
            let heading = 360.0 * i as f64 / n as f64;
            let color = base_color((i % BASE_COLOR_COUNT as usize) as u32);
            created.push(self.spawn_turtle(breed, Point::default(), heading, color)?);
        }
        Ok(created)
    }

    /// Creates `n` turtles on patch `patch` with random base colours and headings.
    pub fn sprout(&mut self, patch: usize, n: usize, breed: &str) -> Result<Vec<i64>, AgentError> {
        let centre = self.patch(patch)?.center();
        let mut created = Vec::with_capacity(n);
        for _ in 0..n {
            let color = base_color(self.rng().random_range(0..BASE_COLOR_COUNT));
            let heading = f64::from(self.rng().random_range(0..360_u32));
            created.push(self.spawn_turtle(breed, centre, heading, color)?);
        }
        Ok(created)
    }

    /// Creates `n` copies of `parent` on its position. Declared variables are carried
    /// by name when the children belong to another breed.
    pub fn hatch(
        &mut self,
        parent: i64,
        n: usize,
        breed: Option<&str>,
    ) -> Result<Vec<i64>, AgentError> {
        let template = self.turtle(parent)?.clone();
        let (breed, _) = self.resolve_turtle_breed(breed.unwrap_or(&template.breed))?;
        let mut vars = template.vars.clone();
        if breed != template.breed {
            if let (Some(old), Some(new)) =
                (self.schema.turtles(&template.breed), self.schema.turtles(&breed))
            {
                Remap::between(old, new).apply(&mut vars);
            }
        }
        let mut created = Vec::with_capacity(n);
        for _ in 0..n {
            let child = Turtle {
                id: self.next_turtle_id,
                breed: breed.clone(),
                vars: vars.clone(),
                links: BTreeSet::new(),
                ..template.clone()
            };
            created.push(self.register_turtle(child)?);
        }
        Ok(created)
    }

    /// Returns turtle `id`, creating a default unbred turtle with exactly that id if absent.
    ///
    /// Used by importers, which see ids out of order.
    pub fn get_or_create_turtle(&mut self, id: i64) -> Result<i64, AgentError> {
        if id < 0 {
            return Err(AgentError::NoSuchAgent {
                kind: AgentKind::Turtle,
                id,
            });
        }
        if self.turtles.contains_key(&id) {
            return Ok(id);
        }
        let (breed, own_count) = self.resolve_turtle_breed(TURTLES)?;
        let origin = self.patch_at_point(Point::default())?;
        self.register_turtle(Turtle::new(id, &breed, Point::default(), origin, own_count))
    }

    /// Moves a turtle into another breed, carrying declared variables by name.
    pub fn set_breed(&mut self, id: i64, breed: &str) -> Result<(), AgentError> {
        let (breed, _) = self.resolve_turtle_breed(breed)?;
        let current = self.turtle(id)?.breed.clone();
        if current == breed {
            return Ok(());
        }
        let remap = match (self.schema.turtles(&current), self.schema.turtles(&breed)) {
            (Some(old), Some(new)) => Remap::between(old, new),
            _ => return Err(AgentError::NoSuchBreed(breed)),
        };
        if let Some(set) = self.turtle_breeds.get_mut(&current) {
            set.remove(id);
        }
        if let Some(set) = self.turtle_breeds.get_mut(&breed) {
            set.insert(id)?;
        }
        let turtle = self.turtle_mut(id)?;
        remap.apply(&mut turtle.vars);
        turtle.breed = breed;
        self.dirty = true;
        Ok(())
    }

    /// Kills a turtle and every link attached to it, returning the corpse with id `-1`.
    pub fn die(&mut self, id: i64) -> Result<Turtle, AgentError> {
        let link_ids: Vec<i64> = self.turtle(id)?.links.iter().copied().collect();
        for link in link_ids {
            if self.links.contains_key(&link) {
                self.kill_link(link)?;
            }
        }
        let mut turtle = self
            .turtles
            .remove(&id)
            .ok_or(AgentError::dead(AgentKind::Turtle))?;
        if let Some(patch) = self.patches.get_mut(turtle.patch_here) {
            patch.turtles_here.retain(|other| *other != id);
        }
        if let Some(set) = self.turtle_breeds.get_mut(&turtle.breed) {
            set.remove(id);
        }
        if self.observer.target() == Some(AgentRef::Turtle(id)) {
            self.observer.reset_perspective(self.topology.bounds());
        }
        turtle.id = DEAD_ID;
        self.dirty = true;
        Ok(turtle)
    }

    /// Places turtle `id` at `target`, keeping the patch lists, pen and camera in step.
    ///
    /// The target is wrapped before anything changes, so an off-world target on a
    /// non-wrapping axis fails with the turtle untouched. Pen lines run to the
    /// unwrapped target. Returns the previous position. Ties are not propagated.
    pub(crate) fn relocate(&mut self, id: i64, target: Point, draw: bool) -> Result<Point, AgentError> {
        let wrapped = self.topology.wrap_point(target)?;
        let patch_here = self.patch_at_point(wrapped)?;
        let turtle = self
            .turtles
            .get_mut(&id)
            .ok_or(AgentError::dead(AgentKind::Turtle))?;
        let old = turtle.position;
        if draw && turtle.pen_mode != PenMode::Up && old != target {
            self.drawing.push(DrawingLine {
                from: old,
                to: target,
                color: turtle.color.clone(),
                size: turtle.pen_size,
                mode: turtle.pen_mode,
            });
        }
        turtle.position = wrapped;
        let previous_patch = std::mem::replace(&mut turtle.patch_here, patch_here);
        let orientation = turtle.orientation();
        if previous_patch != patch_here {
            if let Some(patch) = self.patches.get_mut(previous_patch) {
                patch.turtles_here.retain(|other| *other != id);
            }
            self.patches[patch_here].turtles_here.push(id);
        }
        if self.observer.target() == Some(AgentRef::Turtle(id)) {
            self.observer.track(
                wrapped,
                orientation.heading,
                orientation.pitch,
                orientation.roll,
            );
        }
        self.dirty = true;
        Ok(old)
    }

    /// Moves with every side effect, dragging tied turtles along by the requested displacement.
    fn move_turtle(&mut self, id: i64, target: Point, draw: bool) -> Result<(), AgentError> {
        let old = self.relocate(id, target, draw)?;
        let delta = Point::new_3d(target.x - old.x, target.y - old.y, target.z - old.z);
        self.propagate_translation(id, delta);
        Ok(())
    }

    pub fn set_xy(&mut self, id: i64, x: f64, y: f64) -> Result<(), AgentError> {
        let z = self.turtle(id)?.position.z;
        self.move_turtle(id, Point::new_3d(x, y, z), true)
    }

    pub fn set_xyz(&mut self, id: i64, x: f64, y: f64, z: f64) -> Result<(), AgentError> {
        self.require_3d("setxyz")?;
        self.move_turtle(id, Point::new_3d(x, y, z), true)
    }

    pub fn set_xcor(&mut self, id: i64, x: f64) -> Result<(), AgentError> {
        let position = self.turtle(id)?.position;
        self.move_turtle(id, Point { x, ..position }, true)
    }

    pub fn set_ycor(&mut self, id: i64, y: f64) -> Result<(), AgentError> {
        let position = self.turtle(id)?.position;
        self.move_turtle(id, Point { y, ..position }, true)
    }

    pub fn set_zcor(&mut self, id: i64, z: f64) -> Result<(), AgentError> {
        self.require_3d("zcor")?;
        let position = self.turtle(id)?.position;
        self.move_turtle(id, Point { z, ..position }, true)
    }

    fn require_3d(&self, what: &str) -> Result<(), AgentError> {
        if self.is_3d() {
            Ok(())
        } else {
            Err(AgentError::invalid(format!("{what} needs a 3D world")))
        }
    }

    fn destination(&self, id: i64, distance: f64) -> Result<Point, AgentError> {
        let turtle = self.turtle(id)?;
        Ok(offset(
            turtle.position,
            turtle.direction(self.is_3d()),
            distance,
        ))
    }

    /// Moves straight along the heading without drawing. Off-world destinations on
    /// a non-wrapping axis fail and leave the turtle where it was.
    pub fn jump(&mut self, id: i64, distance: f64) -> Result<(), AgentError> {
        let target = self.destination(id, distance)?;
        self.move_turtle(id, target, false)
    }

    /// Walks `distance` in unit steps then the remainder. A step that would leave a
    /// non-wrapping world ends the walk at the last position reached, without error.
    pub fn forward(&mut self, id: i64, distance: f64) -> Result<(), AgentError> {
        let sign = if distance < 0.0 { -1.0 } else { 1.0 };
        let mut remaining = distance.abs();
        while remaining > 0.0 {
            let step = remaining.min(1.0);
            let target = self.destination(id, sign * step)?;
            match self.move_turtle(id, target, true) {
                Ok(()) => {}
                Err(err) if is_out_of_bounds(&err) => {
                    debug!(turtle = id, "forward stopped at the world edge");
                    break;
                }
                Err(err) => return Err(err),
            }
            remaining -= step;
        }
        Ok(())
    }

    pub fn back(&mut self, id: i64, distance: f64) -> Result<(), AgentError> {
        self.forward(id, -distance)
    }

    /// Returns true when a jump of `distance` would stay in the world.
    pub fn can_move(&self, id: i64, distance: f64) -> Result<bool, AgentError> {
        let target = self.destination(id, distance)?;
        Ok(self.topology.wrap_point(target).is_ok())
    }

    /// Position of a turtle or the centre of a patch.
    pub fn agent_position(&self, agent: AgentRef) -> Result<Point, AgentError> {
        match agent {
            AgentRef::Turtle(id) => Ok(self.turtle(id)?.position),
            AgentRef::Patch(index) => Ok(self.patch(index)?.center()),
            other => Err(AgentError::invalid(format!(
                "{other} has no position"
            ))),
        }
    }

    /// Moves onto the position of `agent`; the pen traces the shortest path.
    pub fn move_to(&mut self, id: i64, agent: AgentRef) -> Result<(), AgentError> {
        let destination = self.agent_position(agent)?;
        let from = self.turtle(id)?.position;
        let target = self.topology.shortest_path(from, destination);
        self.move_turtle(id, target, true)
    }

    /// Moves to the world origin; the heading is kept.
    pub fn home(&mut self, id: i64) -> Result<(), AgentError> {
        self.move_turtle(id, Point::default(), true)
    }

    /// Turns toward `agent`. Facing an agent on the same point is a no-op.
    pub fn face(&mut self, id: i64, agent: AgentRef) -> Result<(), AgentError> {
        let point = self.agent_position(agent)?;
        self.face_point(id, point)
    }

    pub fn face_xy(&mut self, id: i64, x: f64, y: f64) -> Result<(), AgentError> {
        self.face_point(id, Point::new(x, y))
    }

    fn face_point(&mut self, id: i64, point: Point) -> Result<(), AgentError> {
        let turtle = self.turtle(id)?;
        let from = turtle.position;
        let current = turtle.orientation();
        let heading = match self.topology.towards(from, point) {
            Ok(heading) => heading,
            Err(TopologyError::CoincidentPoints) if !self.is_3d() => return Ok(()),
            Err(TopologyError::CoincidentPoints) => current.heading,
            Err(err) => return Err(err.into()),
        };
        let pitch = if self.is_3d() {
            match self.topology.towards_pitch(from, point) {
                Ok(pitch) => pitch,
                Err(TopologyError::CoincidentPoints) => return Ok(()),
                Err(err) => return Err(err.into()),
            }
        } else {
            current.pitch
        };
        self.orient(
            id,
            Orientation {
                heading,
                pitch,
                ..current
            },
        )
    }

    pub fn set_heading(&mut self, id: i64, heading: f64) -> Result<(), AgentError> {
        let current = self.turtle(id)?.orientation();
        self.orient(id, Orientation { heading, ..current })
    }

    pub fn right(&mut self, id: i64, angle: f64) -> Result<(), AgentError> {
        let heading = self.turtle(id)?.heading;
        self.set_heading(id, heading + angle)
    }

    pub fn left(&mut self, id: i64, angle: f64) -> Result<(), AgentError> {
        self.right(id, -angle)
    }

    pub fn set_pitch(&mut self, id: i64, pitch: f64) -> Result<(), AgentError> {
        self.require_3d("pitch")?;
        let current = self.turtle(id)?.orientation();
        self.orient(id, Orientation { pitch, ..current })
    }

    pub fn set_roll(&mut self, id: i64, roll: f64) -> Result<(), AgentError> {
        self.require_3d("roll")?;
        let current = self.turtle(id)?.orientation();
        self.orient(id, Orientation { roll, ..current })
    }

    /// Applies a normalized orientation and rotates tied turtles by the change.
    pub(crate) fn orient(&mut self, id: i64, orientation: Orientation) -> Result<(), AgentError> {
        let next = orientation.normalized();
        let old = self.set_orientation_raw(id, next)?;
        if old != next {
            self.propagate_rotation(id, old, next);
        }
        Ok(())
    }

    /// Sets an orientation without tie propagation, returning the previous one.
    pub(crate) fn set_orientation_raw(
        &mut self,
        id: i64,
        orientation: Orientation,
    ) -> Result<Orientation, AgentError> {
        let turtle = self.turtle_mut(id)?;
        let old = turtle.orientation();
        turtle.heading = orientation.heading;
        turtle.pitch = orientation.pitch;
        turtle.roll = orientation.roll;
        let position = turtle.position;
        if self.observer.target() == Some(AgentRef::Turtle(id)) {
            self.observer.track(
                position,
                orientation.heading,
                orientation.pitch,
                orientation.roll,
            );
        }
        self.dirty = true;
        Ok(old)
    }

    /// Wrap-aware distance from a turtle to another agent.
    pub fn distance(&self, id: i64, agent: AgentRef) -> Result<f64, AgentError> {
        let from = self.turtle(id)?.position;
        Ok(self.topology.distance(from, self.agent_position(agent)?))
    }

    pub fn distance_xy(&self, id: i64, x: f64, y: f64) -> Result<f64, AgentError> {
        let from = self.turtle(id)?.position;
        Ok(self.topology.distance(from, Point::new(x, y)))
    }

    /// Heading from a turtle to another agent along the shortest path.
    pub fn towards(&self, id: i64, agent: AgentRef) -> Result<f64, AgentError> {
        let from = self.turtle(id)?.position;
        Ok(self.topology.towards(from, self.agent_position(agent)?)?)
    }

    pub fn towards_xy(&self, id: i64, x: f64, y: f64) -> Result<f64, AgentError> {
        let from = self.turtle(id)?.position;
        Ok(self.topology.towards(from, Point::new(x, y))?)
    }

    pub fn set_pen_mode(&mut self, id: i64, mode: PenMode) -> Result<(), AgentError> {
        self.turtle_mut(id)?.pen_mode = mode;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::config::WorldConfig;
    use crate::drawing::PenMode;
    use crate::error::AgentError;
    use crate::observer::Perspective;
    use crate::program::Program;
    use crate::value::{AgentRef, Value};
    use crate::world::World;
    use logoworld_topology::{Point, WorldBounds};

    fn world(wrap: bool) -> World {
        World::new(WorldConfig::centered(2, 2, wrap).with_seed(42)).expect("world")
    }

    fn one_turtle(world: &mut World) -> i64 {
        let id = world.create_turtles(1, "turtles").expect("create")[0];
        world.set_heading(id, 0.0).expect("heading");
        id
    }

    #[test]
    fn jump_wraps_on_a_torus() {
        let mut world = world(true);
        let id = one_turtle(&mut world);
        world.jump(id, 1.0).expect("jump");
        assert_eq!(world.turtle(id).expect("turtle").position(), Point::new(0.0, 1.0));
        world.jump(id, 2.0).expect("jump");
        assert_eq!(world.turtle(id).expect("turtle").ycor(), -2.0);
    }

    #[test]
    fn jump_off_a_box_fails_and_leaves_turtle_in_place() {
        let mut world = world(false);
        let id = one_turtle(&mut world);
        world.set_xy(id, 0.0, 2.0).expect("setxy");
        let patch = world.turtle(id).expect("turtle").patch_here();
        let err = world.jump(id, 1.0).expect_err("off world");
        assert!(matches!(err, AgentError::Topology(_)));
        let turtle = world.turtle(id).expect("turtle");
        assert_eq!(turtle.position(), Point::new(0.0, 2.0));
        assert_eq!(turtle.patch_here(), patch);
        assert!(!world.can_move(id, 1.0).expect("can-move"));
    }

    #[test]
    fn forward_stops_at_the_edge() {
        let mut world = world(false);
        let id = one_turtle(&mut world);
        world.forward(id, 10.0).expect("forward");
        assert_eq!(world.turtle(id).expect("turtle").position(), Point::new(0.0, 2.0));
        world.forward(id, -1.5).expect("back");
        assert_eq!(world.turtle(id).expect("turtle").ycor(), 0.5);
    }

    #[test]
    fn moving_keeps_patch_lists_in_step() {
        let mut world = world(true);
        let id = one_turtle(&mut world);
        let origin = world.patch_at(0.0, 0.0).expect("origin");
        world.set_xy(id, 1.2, -0.7).expect("setxy");
        let target = world.patch_at(1.0, -1.0).expect("target");
        assert!(world.patch(origin).expect("patch").turtles_here().is_empty());
        assert_eq!(world.patch(target).expect("patch").turtles_here(), &[id]);
        assert_eq!(world.turtle(id).expect("turtle").patch_here(), target);
    }

    #[test]
    fn headings_are_normalized_and_face_ignores_coincident_points() {
        let mut world = world(true);
        let id = one_turtle(&mut world);
        world.right(id, -90.0).expect("right");
        assert_eq!(world.turtle(id).expect("turtle").heading(), 270.0);
        world.face_xy(id, 0.0, 0.0).expect("face self");
        assert_eq!(world.turtle(id).expect("turtle").heading(), 270.0);
        world.face_xy(id, 1.0, 0.0).expect("face east");
        assert_eq!(world.turtle(id).expect("turtle").heading(), 90.0);
        world.face_xy(id, -2.0, 0.0).expect("face west");
        assert_eq!(world.turtle(id).expect("turtle").heading(), 270.0);
    }

    #[test]
    fn pen_down_records_unwrapped_lines() {
        let mut world = world(true);
        let id = one_turtle(&mut world);
        world.set_pen_mode(id, PenMode::Down).expect("pen down");
        world.set_xy(id, 0.0, 2.0).expect("setxy");
        world.forward(id, 1.0).expect("forward");
        world.jump(id, 1.0).expect("jump");
        let lines = world.drawing().lines();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1].from, Point::new(0.0, 2.0));
        assert_eq!(lines[1].to, Point::new(0.0, 3.0));
        assert_eq!(world.turtle(id).expect("turtle").ycor(), -1.0);
    }

    #[test]
    fn die_removes_the_turtle_everywhere() {
        let program = Program::new().with_breed("wolves", "wolf", ["energy"]);
        let mut world =
            World::with_program(WorldConfig::centered(2, 2, true).with_seed(1), program)
                .expect("world");
        let id = world.create_turtles(1, "wolves").expect("create")[0];
        world
            .set_perspective(Perspective::Follow, Some(AgentRef::Turtle(id)))
            .expect("follow");
        let corpse = world.die(id).expect("die");
        assert_eq!(corpse.id(), -1);
        assert!(!world.is_alive(AgentRef::Turtle(id)));
        assert!(world.turtle_breed("WOLVES").expect("breed").is_empty());
        assert!(world.patches().iter().all(|p| p.turtles_here().is_empty()));
        assert_eq!(world.observer().perspective(), Perspective::Observe);
        assert!(matches!(world.die(id), Err(AgentError::DeadAgent { .. })));
    }

    #[test]
    fn hatch_copies_state_and_remaps_breed_variables() {
        let program = Program::new()
            .with_breed("wolves", "wolf", ["energy", "age"])
            .with_breed("sheep", "a-sheep", ["wool", "energy"]);
        let mut world =
            World::with_program(WorldConfig::centered(5, 5, true).with_seed(8), program)
                .expect("world");
        let wolf = world.create_turtles(1, "wolves").expect("create")[0];
        world.set_xy(wolf, 1.5, -2.0).expect("setxy");
        world.turtles.get_mut(&wolf).expect("wolf").vars = vec![Value::Number(7.0), Value::Number(3.0)];
        let pups = world.hatch(wolf, 2, None).expect("hatch");
        assert_eq!(pups, vec![1, 2]);
        let pup = world.turtle(1).expect("pup");
        assert_eq!(pup.position(), Point::new(1.5, -2.0));
        assert_eq!(pup.vars(), &[Value::Number(7.0), Value::Number(3.0)]);
        assert!(pup.link_ids().next().is_none());

        let lamb = world.hatch(wolf, 1, Some("sheep")).expect("hatch sheep")[0];
        assert_eq!(
            world.turtle(lamb).expect("lamb").vars(),
            &[Value::Number(0.0), Value::Number(7.0)]
        );
        assert_eq!(world.turtle_breed("SHEEP").expect("sheep").len(), 1);
    }

    #[test]
    fn ordered_turtles_spread_headings() {
        let mut world = world(true);
        let ids = world.create_ordered_turtles(4, "turtles").expect("cro");
        let headings: Vec<f64> = ids
            .iter()
            .map(|id| world.turtle(*id).expect("turtle").heading())
            .collect();
        assert_eq!(headings, vec![0.0, 90.0, 180.0, 270.0]);
        assert!(world.create_turtles(1, "wolves").is_err());
    }

    #[test]
    fn imported_ids_advance_the_counter() {
        let mut world = world(true);
        world.get_or_create_turtle(7).expect("turtle 7");
        world.get_or_create_turtle(3).expect("turtle 3");
        assert_eq!(world.create_turtles(1, "turtles").expect("create"), vec![8]);
        assert!(world.get_or_create_turtle(-1).is_err());
    }

    #[test]
    fn volumetric_jump_follows_pitch() {
        let config = WorldConfig {
            bounds: WorldBounds::new_3d(-2, 2, -2, 2, -2, 2),
            ..WorldConfig::default().with_seed(4)
        };
        let mut world = World::new(config).expect("world");
        let id = one_turtle(&mut world);
        world.set_pitch(id, 90.0).expect("pitch");
        world.jump(id, 1.0).expect("jump");
        assert_eq!(world.turtle(id).expect("turtle").position(), Point::new_3d(0.0, 0.0, 1.0));
        world.set_zcor(id, 2.4).expect("zcor");
        world.jump(id, 1.0).expect("wraps");
        assert!((world.turtle(id).expect("turtle").zcor() + 1.6).abs() < 1e-9);
    }
}
