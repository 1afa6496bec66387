use crate::agentset::{AgentSet, ArrayAgentSet};
use crate::error::AgentError;
use crate::value::{AgentKind, AgentRef};
use crate::world::World;
use logoworld_topology::{
    Axis, PATCH_DIAGONAL_SLACK, PatchCoord, Point, heading_components, heading_of,
    subtract_headings,
};
use ordered_float::OrderedFloat;

/// Viewing cone of a turtle.
#[derive(Debug, Clone, Copy)]
struct Cone {
    apex: Point,
    heading: f64,
    pitch: f64,
    half_angle: f64,
    radius: f64,
}

impl World {
    /// Members of `source` within `radius` of `origin`, in discovery order.
    ///
    /// Only patches in the wrap-aware window around the origin are examined, and a
    /// patch whose centre is farther than the radius plus half a diagonal cannot
    /// hold a turtle in range, so its turtles are never measured.
    pub fn in_radius(
        &self,
        origin: AgentRef,
        source: &AgentSet,
        radius: f64,
        wrap: bool,
    ) -> Result<ArrayAgentSet, AgentError> {
        if radius < 0.0 {
            return Err(AgentError::invalid("in-radius needs a non-negative radius"));
        }
        let start = self.agent_position(origin)?;
        let kind = source.kind();
        let membership = source.membership();
        let mut found = Vec::new();
        let mut candidates = Vec::new();
        match kind {
            AgentKind::Patch => {
                self.topology
                    .visit_window(start, radius, wrap, &mut |coord, distance| {
                        if distance <= OrderedFloat(radius) {
                            candidates.push(coord);
                        }
                    })?;
                for coord in candidates {
                    let agent = self.patch_agent(coord)?;
                    if membership.admits(self, agent) {
                        found.push(agent);
                    }
                }
            }
            AgentKind::Turtle => {
                let reach = OrderedFloat(radius + PATCH_DIAGONAL_SLACK);
                self.topology
                    .visit_window(start, radius, wrap, &mut |coord, distance| {
                        if distance <= reach {
                            candidates.push(coord);
                        }
                    })?;
                for coord in candidates {
                    let AgentRef::Patch(index) = self.patch_agent(coord)? else {
                        continue;
                    };
                    for id in &self.patches[index].turtles_here {
                        let agent = AgentRef::Turtle(*id);
                        let position = self.turtles[id].position;
                        if self.topology.distance_with(start, position, wrap) <= radius
                            && membership.admits(self, agent)
                        {
                            found.push(agent);
                        }
                    }
                }
            }
            other => {
                return Err(AgentError::invalid(format!(
                    "in-radius cannot search {other}s"
                )));
            }
        }
        ArrayAgentSet::from_agents(kind, found)
    }

    /// Members of `source` inside the cone of `angle` degrees and `radius` in front of
    /// turtle `id`. On wrapping axes every copy of the world the radius can reach is
    /// tried and the first copy inside the cone admits the agent.
    pub fn in_cone(
        &self,
        id: i64,
        source: &AgentSet,
        radius: f64,
        angle: f64,
        wrap: bool,
    ) -> Result<ArrayAgentSet, AgentError> {
        if radius < 0.0 {
            return Err(AgentError::invalid("in-cone needs a non-negative radius"));
        }
        if !(0.0..=360.0).contains(&angle) {
            return Err(AgentError::invalid("in-cone angle must be between 0 and 360"));
        }
        let turtle = self.turtle(id)?;
        let cone = Cone {
            apex: turtle.position,
            heading: turtle.heading,
            pitch: turtle.pitch,
            half_angle: angle / 2.0,
            radius,
        };
        let copies = if wrap {
            self.topology.world_copies(radius)
        } else {
            (0, 0, 0)
        };
        let kind = source.kind();
        let membership = source.membership();
        let reach = match kind {
            AgentKind::Patch => OrderedFloat(radius),
            AgentKind::Turtle => OrderedFloat(radius + PATCH_DIAGONAL_SLACK),
            other => {
                return Err(AgentError::invalid(format!("in-cone cannot search {other}s")));
            }
        };
        let mut candidates = Vec::new();
        self.topology
            .visit_window(cone.apex, radius, wrap, &mut |coord, distance| {
                if distance <= reach {
                    candidates.push(coord);
                }
            })?;
        let mut found = Vec::new();
        for coord in candidates {
            let patch_agent = self.patch_agent(coord)?;
            if kind == AgentKind::Patch {
                if self.sees(&cone, coord.center(), copies) && membership.admits(self, patch_agent)
                {
                    found.push(patch_agent);
                }
                continue;
            }
            let AgentRef::Patch(index) = patch_agent else {
                continue;
            };
            for other in &self.patches[index].turtles_here {
                let agent = AgentRef::Turtle(*other);
                if self.sees(&cone, self.turtles[other].position, copies)
                    && membership.admits(self, agent)
                {
                    found.push(agent);
                }
            }
        }
        ArrayAgentSet::from_agents(kind, found)
    }

    /// Member of `source` closest to `origin`; the first in forward order wins ties.
    pub fn nearest(
        &self,
        origin: AgentRef,
        source: &AgentSet,
    ) -> Result<Option<AgentRef>, AgentError> {
        let start = self.agent_position(origin)?;
        let mut best = None;
        for agent in source.members(self) {
            let distance = OrderedFloat(self.topology.distance(start, self.agent_position(agent)?));
            if best.is_none_or(|(_, current)| distance < current) {
                best = Some((agent, distance));
            }
        }
        Ok(best.map(|(agent, _)| agent))
    }

    fn patch_agent(&self, coord: PatchCoord) -> Result<AgentRef, AgentError> {
        self.topology
            .patch_index(coord)
            .map(AgentRef::Patch)
            .ok_or_else(|| AgentError::Corrupted(format!("search window left the world at {coord}")))
    }

    fn sees(&self, cone: &Cone, target: Point, copies: (i32, i32, i32)) -> bool {
        let bounds = self.topology.bounds();
        let width = f64::from(bounds.extent(Axis::X));
        let height = f64::from(bounds.extent(Axis::Y));
        let depth = f64::from(bounds.extent(Axis::Z));
        for i in -copies.0..=copies.0 {
            for j in -copies.1..=copies.1 {
                for k in -copies.2..=copies.2 {
                    let copy = Point::new_3d(
                        target.x + f64::from(i) * width,
                        target.y + f64::from(j) * height,
                        target.z + f64::from(k) * depth,
                    );
                    if self.cone_contains(cone, copy) {
                        return true;
                    }
                }
            }
        }
        false
    }

    fn cone_contains(&self, cone: &Cone, point: Point) -> bool {
        let distance = cone.apex.distance_unwrapped(point);
        if distance > cone.radius {
            return false;
        }
        if distance == 0.0 {
            return true;
        }
        let (dx, dy, dz) = (
            point.x - cone.apex.x,
            point.y - cone.apex.y,
            point.z - cone.apex.z,
        );
        if self.is_3d() {
            let (sin_h, cos_h) = heading_components(cone.heading);
            let (sin_p, cos_p) = heading_components(cone.pitch);
            let cosine = (cos_p * sin_h * dx + cos_p * cos_h * dy + sin_p * dz) / distance;
            cosine.clamp(-1.0, 1.0).acos().to_degrees() <= cone.half_angle
        } else {
            match heading_of(dx, dy) {
                Ok(bearing) => subtract_headings(bearing, cone.heading).abs() <= cone.half_angle,
                Err(_) => true,
            }
        }
    }
}
