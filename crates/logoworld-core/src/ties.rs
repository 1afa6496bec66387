//! Tie propagation: dragging and rotating the turtles tied to one that moved or turned.
//!
//! A traversal never recurses. Pending work sits on an explicit stack, each item
//! carrying the index of the visited-set scope it belongs to, so tie cycles of
//! any length terminate and deep tie trees cannot overflow the call stack. Every
//! leaf of a turtle is marked visited before any of them is moved; the leaves are
//! then handled one at a time in link order, each leaf's own ties settled before
//! its next sibling moves. When a rigid leaf has been swung, its own rotation and
//! the rest of its siblings run in a copy of the scope taken just before it moved,
//! so the turtles its move dragged are still rotated around it afterwards.

use crate::link::TieMode;
use crate::world::World;
use logoworld_topology::{INFINITESIMAL, Point, heading_components, normalize_heading, subtract_headings};
use std::collections::HashSet;
use tracing::debug;

/// Heading, pitch and roll of a turtle, in degrees.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct Orientation {
    pub(crate) heading: f64,
    pub(crate) pitch: f64,
    pub(crate) roll: f64,
}

impl Orientation {
    pub(crate) fn normalized(self) -> Self {
        Self {
            heading: normalize_heading(self.heading),
            pitch: normalize_heading(self.pitch),
            roll: normalize_heading(self.roll),
        }
    }

    /// Body frame as matrix columns `[right, forward, up]`.
    fn frame(&self) -> Matrix {
        let (sin_h, cos_h) = heading_components(self.heading);
        let (sin_p, cos_p) = heading_components(self.pitch);
        let (sin_r, cos_r) = heading_components(self.roll);
        let forward = [cos_p * sin_h, cos_p * cos_h, sin_p];
        let right0 = [cos_h, -sin_h, 0.0];
        let up0 = [-sin_p * sin_h, -sin_p * cos_h, cos_p];
        let right = combine(right0, cos_r, up0, -sin_r);
        let up = combine(up0, cos_r, right0, sin_r);
        Matrix::from_columns(right, forward, up)
    }

    /// Inverse of [`Orientation::frame`].
    fn from_frame(frame: &Matrix) -> Self {
        let [right, forward, _] = frame.columns();
        let pitch = forward[2].clamp(-1.0, 1.0).asin().to_degrees();
        let heading = if forward[0].abs() < INFINITESIMAL && forward[1].abs() < INFINITESIMAL {
            // Looking straight up or down: fold all of the roll into the heading.
            (-right[1]).atan2(right[0]).to_degrees()
        } else {
            forward[0].atan2(forward[1]).to_degrees()
        };
        let (sin_h, cos_h) = heading_components(heading);
        let (sin_p, cos_p) = heading_components(pitch);
        let right0 = [cos_h, -sin_h, 0.0];
        let up0 = [-sin_p * sin_h, -sin_p * cos_h, cos_p];
        let roll = (-dot(right, up0)).atan2(dot(right, right0)).to_degrees();
        Self {
            heading,
            pitch,
            roll,
        }
        .normalized()
    }
}

fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn combine(a: [f64; 3], wa: f64, b: [f64; 3], wb: f64) -> [f64; 3] {
    [
        a[0] * wa + b[0] * wb,
        a[1] * wa + b[1] * wb,
        a[2] * wa + b[2] * wb,
    ]
}

/// Row-major 3x3 matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Matrix([[f64; 3]; 3]);

impl Matrix {
    fn from_columns(a: [f64; 3], b: [f64; 3], c: [f64; 3]) -> Self {
        Matrix([[a[0], b[0], c[0]], [a[1], b[1], c[1]], [a[2], b[2], c[2]]])
    }

    fn columns(&self) -> [[f64; 3]; 3] {
        let m = &self.0;
        [
            [m[0][0], m[1][0], m[2][0]],
            [m[0][1], m[1][1], m[2][1]],
            [m[0][2], m[1][2], m[2][2]],
        ]
    }

    fn transpose(&self) -> Self {
        let [a, b, c] = self.columns();
        Matrix([a, b, c])
    }

    fn mul(&self, other: &Matrix) -> Matrix {
        let mut out = [[0.0; 3]; 3];
        for (row, out_row) in out.iter_mut().enumerate() {
            for (col, cell) in out_row.iter_mut().enumerate() {
                *cell = (0..3).map(|k| self.0[row][k] * other.0[k][col]).sum();
            }
        }
        Matrix(out)
    }

    fn apply(&self, v: Point) -> Point {
        let m = &self.0;
        Point::new_3d(
            m[0][0] * v.x + m[0][1] * v.y + m[0][2] * v.z,
            m[1][0] * v.x + m[1][1] * v.y + m[1][2] * v.z,
            m[2][0] * v.x + m[2][1] * v.y + m[2][2] * v.z,
        )
    }
}

/// Change of orientation applied around a root turtle.
#[derive(Debug, Clone, Copy)]
enum Turn {
    /// Planar worlds: a heading change in degrees.
    Planar(f64),
    /// Volumetric worlds: the rotation taking the old body frame to the new one.
    Spatial(Matrix),
}

#[derive(Debug)]
enum Task {
    /// Claim the leaves of `root` and drag each of them.
    Translate { root: i64, delta: Point, scope: usize },
    /// Move one claimed leaf, then its own leaves.
    Drag { leaf: i64, delta: Point, scope: usize },
    /// Claim the leaves of `root` and swing each of them around it.
    Rotate { root: i64, turn: Turn, scope: usize },
    /// Swing one claimed leaf; `frame` names the scope its siblings share.
    Swing {
        root: i64,
        leaf: i64,
        mode: TieMode,
        turn: Turn,
        frame: usize,
    },
}

impl World {
    /// Turtles dragged by `root`: the far end of every tied link `root` starts,
    /// plus the near end of every tied undirected link `root` finishes.
    fn tied_turtles(&self, root: i64) -> Vec<(i64, TieMode)> {
        let Some(turtle) = self.turtles.get(&root) else {
            return Vec::new();
        };
        let tied: Vec<_> = turtle
            .links
            .iter()
            .filter_map(|id| self.links.get(id))
            .filter(|link| link.tie_mode.is_tied())
            .collect();
        let started = tied
            .iter()
            .filter(|link| link.end1 == root)
            .map(|link| (link.end2, link.tie_mode));
        let finished = tied
            .iter()
            .filter(|link| !link.directed && link.end2 == root)
            .map(|link| (link.end1, link.tie_mode));
        started.chain(finished).collect()
    }

    /// Drags every turtle tied (transitively) to `root` by `delta`.
    pub(crate) fn propagate_translation(&mut self, root: i64, delta: Point) {
        if self.tie_count == 0 || delta == Point::default() {
            return;
        }
        self.run_ties(root, Task::Translate {
            root,
            delta,
            scope: 0,
        });
    }

    /// Swings every turtle tied to `root` around it after `root` turned from `old` to `new`.
    pub(crate) fn propagate_rotation(&mut self, root: i64, old: Orientation, new: Orientation) {
        if self.tie_count == 0 {
            return;
        }
        let turn = if self.is_3d() {
            Turn::Spatial(new.frame().mul(&old.frame().transpose()))
        } else {
            Turn::Planar(subtract_headings(new.heading, old.heading))
        };
        self.run_ties(root, Task::Rotate {
            root,
            turn,
            scope: 0,
        });
    }

    fn run_ties(&mut self, root: i64, first: Task) {
        let mut scopes: Vec<HashSet<i64>> = vec![HashSet::from([root])];
        // Scope each rotation frame currently uses; a rigid leaf rebinds it.
        let mut frames: Vec<usize> = Vec::new();
        let mut stack = vec![first];
        while let Some(task) = stack.pop() {
            match task {
                Task::Translate { root, delta, scope } => {
                    let leaves = self.claim_leaves(root, &mut scopes[scope]);
                    stack.extend(
                        leaves
                            .into_iter()
                            .rev()
                            .map(|(leaf, _)| Task::Drag { leaf, delta, scope }),
                    );
                }
                Task::Drag { leaf, delta, scope } => {
                    let Ok(position) = self.turtle(leaf).map(|turtle| turtle.position) else {
                        continue;
                    };
                    let target = Point::new_3d(
                        position.x + delta.x,
                        position.y + delta.y,
                        position.z + delta.z,
                    );
                    match self.relocate(leaf, target, true) {
                        Ok(_) => stack.push(Task::Translate {
                            root: leaf,
                            delta,
                            scope,
                        }),
                        Err(err) => debug!(turtle = leaf, %err, "tied turtle left in place"),
                    }
                }
                Task::Rotate { root, turn, scope } => {
                    frames.push(scope);
                    let frame = frames.len() - 1;
                    let leaves = self.claim_leaves(root, &mut scopes[scope]);
                    stack.extend(leaves.into_iter().rev().map(|(leaf, mode)| Task::Swing {
                        root,
                        leaf,
                        mode,
                        turn,
                        frame,
                    }));
                }
                Task::Swing {
                    root,
                    leaf,
                    mode,
                    turn,
                    frame,
                } => {
                    let scope = frames[frame];
                    let rigid = mode == TieMode::Fixed;
                    let Ok(pivot) = self.turtle(root).map(|turtle| turtle.position) else {
                        continue;
                    };
                    let Ok(turtle) = self.turtle(leaf) else {
                        continue;
                    };
                    let (position, orientation) = (turtle.position, turtle.orientation());
                    let Some(delta) = self.swing(pivot, position, turn) else {
                        // Sharing the pivot's point: only a rigid leaf turns.
                        if rigid
                            && self
                                .set_orientation_raw(leaf, turn_orientation(orientation, turn))
                                .is_ok()
                        {
                            stack.push(Task::Rotate {
                                root: leaf,
                                turn,
                                scope,
                            });
                        }
                        continue;
                    };
                    let target = Point::new_3d(
                        position.x + delta.x,
                        position.y + delta.y,
                        position.z + delta.z,
                    );
                    let snapshot = rigid.then(|| scopes[scope].clone());
                    let moved = self.relocate(leaf, target, true);
                    let rebound = snapshot.map(|snapshot| {
                        scopes.push(snapshot);
                        frames[frame] = scopes.len() - 1;
                        scopes.len() - 1
                    });
                    if let Err(err) = moved {
                        debug!(turtle = leaf, %err, "tied turtle left in place");
                        continue;
                    }
                    if let Some(rebound) = rebound {
                        if self
                            .set_orientation_raw(leaf, turn_orientation(orientation, turn))
                            .is_ok()
                        {
                            // Below the drag, so it runs once the drag has finished.
                            stack.push(Task::Rotate {
                                root: leaf,
                                turn,
                                scope: rebound,
                            });
                        }
                    }
                    stack.push(Task::Translate {
                        root: leaf,
                        delta,
                        scope,
                    });
                }
            }
        }
    }

    /// Unvisited leaves of `root`, all marked visited before any is moved.
    fn claim_leaves(&self, root: i64, seen: &mut HashSet<i64>) -> Vec<(i64, TieMode)> {
        let mut claimed = Vec::new();
        for (leaf, mode) in self.tied_turtles(root) {
            if seen.insert(leaf) {
                claimed.push((leaf, mode));
            }
        }
        claimed
    }

    /// Displacement of a leaf at `position` when the turtle at `pivot` turns,
    /// or `None` when the two share a point.
    fn swing(&self, pivot: Point, position: Point, turn: Turn) -> Option<Point> {
        let distance = self.topology.distance(pivot, position);
        if distance == 0.0 {
            return None;
        }
        match turn {
            Turn::Planar(dh) => {
                let bearing = self.topology.towards(pivot, position).ok()?;
                let (old_sin, old_cos) = heading_components(bearing);
                let (new_sin, new_cos) = heading_components(bearing + dh);
                Some(Point::new(
                    distance * (new_sin - old_sin),
                    distance * (new_cos - old_cos),
                ))
            }
            Turn::Spatial(rotation) => {
                let arm = self.topology.delta(pivot, position);
                let swung = rotation.apply(arm);
                Some(Point::new_3d(swung.x - arm.x, swung.y - arm.y, swung.z - arm.z))
            }
        }
    }
}

fn turn_orientation(orientation: Orientation, turn: Turn) -> Orientation {
    match turn {
        Turn::Planar(dh) => Orientation {
            heading: orientation.heading + dh,
            ..orientation
        }
        .normalized(),
        Turn::Spatial(rotation) => Orientation::from_frame(&rotation.mul(&orientation.frame())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorldConfig;
    use crate::drawing::PenMode;
    use logoworld_topology::WorldBounds;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn angle_close(a: f64, b: f64) -> bool {
        subtract_headings(a, b).abs() < 1e-7
    }

    fn world(max: i32, wrap: bool) -> World {
        World::new(WorldConfig::centered(max, max, wrap).with_seed(17)).expect("world")
    }

    #[test]
    fn frames_round_trip_through_orientation() {
        for (heading, pitch, roll) in [(30.0, 20.0, 10.0), (200.0, 330.0, 45.0), (90.0, 0.0, 0.0)] {
            let orientation = Orientation {
                heading,
                pitch,
                roll,
            };
            let back = Orientation::from_frame(&orientation.frame());
            assert!(angle_close(back.heading, heading), "{back:?}");
            assert!(angle_close(back.pitch, pitch), "{back:?}");
            assert!(angle_close(back.roll, roll), "{back:?}");
        }
    }

    #[test]
    fn rigid_ties_drag_and_rotate() {
        let mut world = world(10, true);
        let ids = world.create_turtles(2, "turtles").expect("create");
        let (root, leaf) = (ids[0], ids[1]);
        world.set_heading(root, 0.0).expect("heading");
        world.set_heading(leaf, 0.0).expect("heading");
        world.set_xy(leaf, 0.0, 2.0).expect("setxy");
        let link = world.create_link_to(root, leaf, "links").expect("link");
        world.tie(link).expect("tie");

        world.set_xy(root, 1.0, 0.0).expect("move root");
        let position = world.turtle(leaf).expect("leaf").position();
        assert!(close(position.x, 1.0) && close(position.y, 2.0));

        world.right(root, 90.0).expect("turn root");
        let turtle = world.turtle(leaf).expect("leaf");
        assert!(close(turtle.xcor(), 3.0), "{:?}", turtle.position());
        assert!(close(turtle.ycor(), 0.0), "{:?}", turtle.position());
        assert_eq!(turtle.heading(), 90.0);
    }

    #[test]
    fn rope_ties_translate_without_turning() {
        let mut world = world(10, true);
        let ids = world.create_turtles(2, "turtles").expect("create");
        world.set_heading(ids[0], 0.0).expect("heading");
        world.set_heading(ids[1], 45.0).expect("heading");
        world.set_xy(ids[1], 0.0, 1.0).expect("setxy");
        let link = world.create_link_with(ids[0], ids[1], "links").expect("link");
        world.set_tie_mode(link, TieMode::Free).expect("rope");
        world.right(ids[0], 180.0).expect("turn");
        let leaf = world.turtle(ids[1]).expect("leaf");
        assert!(close(leaf.ycor(), -1.0) && close(leaf.xcor(), 0.0));
        assert_eq!(leaf.heading(), 45.0);

        // Undirected: the second end drags the first as well.
        world.set_xy(ids[1], 0.0, -2.0).expect("move leaf");
        let root = world.turtle(ids[0]).expect("root");
        assert!(close(root.ycor(), -1.0));
    }

    /// Three turtles at the corners of a right triangle, every pair tied by `modes`
    /// in the order (0-1, 1-2, 0-2).
    fn triangle(modes: [TieMode; 3]) -> (World, [i64; 3]) {
        let mut world = world(10, true);
        let ids = world.create_turtles(3, "turtles").expect("create");
        let ids = [ids[0], ids[1], ids[2]];
        for id in ids {
            world.set_heading(id, 0.0).expect("heading");
        }
        world.set_xy(ids[1], 2.0, 0.0).expect("setxy");
        world.set_xy(ids[2], 0.0, 2.0).expect("setxy");
        for ((a, b), mode) in [(ids[0], ids[1]), (ids[1], ids[2]), (ids[0], ids[2])]
            .into_iter()
            .zip(modes)
        {
            let link = world.create_link_with(a, b, "links").expect("link");
            world.set_tie_mode(link, mode).expect("tie");
        }
        (world, ids)
    }

    #[test]
    fn a_rigid_triangle_turns_as_one_body() {
        let (mut world, [root, right, top]) = triangle([TieMode::Fixed; 3]);
        world.right(root, 90.0).expect("turn root");

        let root = world.turtle(root).expect("root");
        assert!(close(root.xcor(), 0.0) && close(root.ycor(), 0.0));
        assert!(angle_close(root.heading(), 90.0));
        let right = world.turtle(right).expect("right");
        assert!(close(right.xcor(), 0.0) && close(right.ycor(), -2.0), "{:?}", right.position());
        assert!(angle_close(right.heading(), 90.0), "{}", right.heading());
        let top = world.turtle(top).expect("top");
        assert!(close(top.xcor(), 2.0) && close(top.ycor(), 0.0), "{:?}", top.position());
        assert!(angle_close(top.heading(), 90.0), "{}", top.heading());
    }

    #[test]
    fn rope_ties_in_a_cycle_swing_without_turning() {
        let (mut world, [root, right, top]) =
            triangle([TieMode::Fixed, TieMode::Free, TieMode::Free]);
        world.right(root, 90.0).expect("turn root");
        let turtle = world.turtle(right).expect("right");
        assert!(close(turtle.xcor(), 0.0) && close(turtle.ycor(), -2.0));
        assert!(angle_close(turtle.heading(), 90.0));
        let turtle = world.turtle(top).expect("top");
        assert!(close(turtle.xcor(), 2.0) && close(turtle.ycor(), 0.0));
        assert!(angle_close(turtle.heading(), 0.0), "{}", turtle.heading());

        // Each member of the cycle is dragged exactly once.
        world.set_xy(root, 1.0, 0.0).expect("move root");
        let turtle = world.turtle(right).expect("right");
        assert!(close(turtle.xcor(), 1.0) && close(turtle.ycor(), -2.0));
        let turtle = world.turtle(top).expect("top");
        assert!(close(turtle.xcor(), 3.0) && close(turtle.ycor(), 0.0));
    }

    #[test]
    fn leaves_settle_their_own_ties_before_the_next_sibling_moves() {
        let mut world = world(10, true);
        let ids = world.create_turtles(4, "turtles").expect("create");
        let (root, first, second, grandchild) = (ids[0], ids[1], ids[2], ids[3]);
        world.set_xy(first, 1.0, 0.0).expect("setxy");
        world.set_xy(second, 2.0, 0.0).expect("setxy");
        world.set_xy(grandchild, 3.0, 0.0).expect("setxy");
        for (from, to) in [(root, first), (root, second), (first, grandchild)] {
            let link = world.create_link_to(from, to, "links").expect("link");
            world.tie(link).expect("tie");
        }
        for id in [first, second, grandchild] {
            world.set_pen_mode(id, PenMode::Down).expect("pen down");
        }
        world.set_ycor(root, 1.0).expect("move root");
        let starts: Vec<f64> = world
            .drawing()
            .lines()
            .iter()
            .map(|line| line.from.x)
            .collect();
        assert_eq!(starts, vec![1.0, 3.0, 2.0]);
    }

    #[test]
    fn a_leaf_blocked_by_the_edge_stays_put() {
        let mut world = world(3, false);
        let ids = world.create_turtles(3, "turtles").expect("create");
        world.set_xy(ids[1], 0.0, 3.0).expect("setxy");
        world.set_xy(ids[2], 1.0, 0.0).expect("setxy");
        for leaf in [ids[1], ids[2]] {
            let link = world.create_link_to(ids[0], leaf, "links").expect("link");
            world.tie(link).expect("tie");
        }
        world.set_ycor(ids[0], 0.5).expect("move root");
        assert_eq!(world.turtle(ids[1]).expect("blocked").ycor(), 3.0);
        assert_eq!(world.turtle(ids[2]).expect("free").ycor(), 0.5);
    }

    #[test]
    fn volumetric_rigid_tie_follows_pitch() {
        let config = WorldConfig {
            bounds: WorldBounds::new_3d(-5, 5, -5, 5, -5, 5),
            ..WorldConfig::default().with_seed(3)
        };
        let mut world = World::new(config).expect("world");
        let ids = world.create_turtles(2, "turtles").expect("create");
        world.set_heading(ids[0], 0.0).expect("heading");
        world.set_heading(ids[1], 0.0).expect("heading");
        world.set_xy(ids[1], 0.0, 2.0).expect("setxy");
        let link = world.create_link_to(ids[0], ids[1], "links").expect("link");
        world.tie(link).expect("tie");
        world.set_pitch(ids[0], 90.0).expect("pitch up");
        let leaf = world.turtle(ids[1]).expect("leaf");
        let position = leaf.position();
        assert!(close(position.x, 0.0) && close(position.y, 0.0) && close(position.z, 2.0), "{position:?}");
        assert!(angle_close(leaf.pitch(), 90.0), "{}", leaf.pitch());
    }
}
