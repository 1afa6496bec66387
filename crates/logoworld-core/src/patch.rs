use crate::agentset::ArrayAgentSet;
use crate::error::AgentError;
use crate::program::Schema;
use crate::value::{AgentKind, AgentRef, Value};
use crate::world::World;
use logoworld_topology::{DiffusionKernel, PatchCoord, Point, Topology};

/// Default label colour shared by patches, turtles and links.
pub(crate) const DEFAULT_LABEL_COLOR: f64 = 9.9;

/// Slot of `pcolor` in the patch layout.
pub(crate) const PCOLOR_SLOT: usize = 2;

/// A fixed grid cell.
#[derive(Debug, Clone, PartialEq)]
pub struct Patch {
    pub(crate) id: usize,
    pub(crate) coord: PatchCoord,
    pub(crate) pcolor: Value,
    pub(crate) plabel: Value,
    pub(crate) plabel_color: Value,
    pub(crate) vars: Vec<Value>,
    pub(crate) turtles_here: Vec<i64>,
}

impl Patch {
    fn new(id: usize, coord: PatchCoord, own_count: usize) -> Self {
        Self {
            id,
            coord,
            pcolor: Value::Number(0.0),
            plabel: Value::Str(String::new()),
            plabel_color: Value::Number(DEFAULT_LABEL_COLOR),
            vars: vec![Value::default(); own_count],
            turtles_here: Vec::new(),
        }
    }

    /// One patch per coordinate of `topology`, indexed by patch id.
    pub(crate) fn build_all(topology: &Topology, schema: &Schema) -> Vec<Patch> {
        let own_count = schema.patches().own_count();
        (0..topology.bounds().patch_count())
            .filter_map(|id| {
                topology
                    .patch_coord(id)
                    .map(|coord| Patch::new(id, coord, own_count))
            })
            .collect()
    }

    /// Restores built-in and declared variables; the turtle list is untouched.
    pub(crate) fn reset(&mut self) {
        self.pcolor = Value::Number(0.0);
        self.plabel = Value::Str(String::new());
        self.plabel_color = Value::Number(DEFAULT_LABEL_COLOR);
        self.vars.fill(Value::default());
    }

    #[must_use]
    pub fn id(&self) -> usize {
        self.id
    }

    #[must_use]
    pub fn coord(&self) -> PatchCoord {
        self.coord
    }

    #[must_use]
    pub fn pxcor(&self) -> i32 {
        self.coord.x
    }

    #[must_use]
    pub fn pycor(&self) -> i32 {
        self.coord.y
    }

    #[must_use]
    pub fn pzcor(&self) -> i32 {
        self.coord.z
    }

    #[must_use]
    pub fn center(&self) -> Point {
        self.coord.center()
    }

    #[must_use]
    pub fn pcolor(&self) -> &Value {
        &self.pcolor
    }

    #[must_use]
    pub fn plabel(&self) -> &Value {
        &self.plabel
    }

    #[must_use]
    pub fn plabel_color(&self) -> &Value {
        &self.plabel_color
    }

    /// Declared (`patches-own`) variables in layout order.
    #[must_use]
    pub fn vars(&self) -> &[Value] {
        &self.vars
    }

    /// Ids of the turtles standing here, in arrival order.
    #[must_use]
    pub fn turtles_here(&self) -> &[i64] {
        &self.turtles_here
    }
}

impl World {
    /// Patch containing `point`, which is wrapped first.
    pub fn patch_at_point(&self, point: Point) -> Result<usize, AgentError> {
        let coord = self.topology.patch_coord_at(point)?;
        self.topology
            .patch_index(coord)
            .ok_or_else(|| AgentError::Corrupted(format!("patch {coord} has no index")))
    }

    /// Patch at the continuous coordinates `(x, y)`, or `None` off a non-wrapping edge.
    #[must_use]
    pub fn patch_at(&self, x: f64, y: f64) -> Option<usize> {
        self.patch_at_point(Point::new(x, y)).ok()
    }

    #[must_use]
    pub fn patch_at_coord(&self, coord: PatchCoord) -> Option<usize> {
        self.topology.patch_index(coord)
    }

    /// Patch reached from `index` by an integer offset, or `None` past a non-wrapping edge.
    #[must_use]
    pub fn patch_at_offset(&self, index: usize, dx: i32, dy: i32) -> Option<usize> {
        let coord = self.topology.patch_coord(index)?;
        self.topology
            .patch_at_offset(coord, dx, dy, 0)
            .and_then(|target| self.topology.patch_index(target))
    }

    /// The eight (26 in volumetric worlds) surrounding patches.
    pub fn patch_neighbors(&self, index: usize) -> Result<ArrayAgentSet, AgentError> {
        let coord = self.patch(index)?.coord;
        self.patch_set(self.topology.neighbors(coord))
    }

    /// The four (six in volumetric worlds) face-adjacent patches.
    pub fn patch_neighbors4(&self, index: usize) -> Result<ArrayAgentSet, AgentError> {
        let coord = self.patch(index)?.coord;
        self.patch_set(self.topology.neighbors4(coord))
    }

    fn patch_set(&self, coords: Vec<PatchCoord>) -> Result<ArrayAgentSet, AgentError> {
        ArrayAgentSet::from_agents(
            AgentKind::Patch,
            coords
                .into_iter()
                .filter_map(|coord| self.topology.patch_index(coord))
                .map(AgentRef::Patch),
        )
    }

    /// Turtles standing on patch `index`.
    pub fn turtles_on_patch(&self, index: usize) -> Result<ArrayAgentSet, AgentError> {
        let patch = self.patch(index)?;
        ArrayAgentSet::from_agents(
            AgentKind::Turtle,
            patch.turtles_here.iter().copied().map(AgentRef::Turtle),
        )
    }

    /// Shares `rate` of a numeric patch variable with the eight neighbors of every patch.
    pub fn diffuse(&mut self, variable: &str, rate: f64) -> Result<usize, AgentError> {
        self.diffuse_with(variable, rate, DiffusionKernel::Neighbors)
    }

    /// Like [`World::diffuse`] but over the four face-adjacent neighbors.
    pub fn diffuse4(&mut self, variable: &str, rate: f64) -> Result<usize, AgentError> {
        self.diffuse_with(variable, rate, DiffusionKernel::Neighbors4)
    }

    fn diffuse_with(
        &mut self,
        variable: &str,
        rate: f64,
        kernel: DiffusionKernel,
    ) -> Result<usize, AgentError> {
        let layout = self.schema.patches();
        let slot = layout
            .index_of(variable)
            .ok_or_else(|| AgentError::NoSuchVariable {
                kind: AgentKind::Patch,
                name: variable.to_uppercase(),
            })?;
        let builtins = layout.builtin_count();
        let name = variable.to_uppercase();
        if slot < builtins && slot != PCOLOR_SLOT {
            return Err(AgentError::invalid(format!("cannot diffuse {name}")));
        }
        let slot_of = |patch: &Patch| -> Value {
            if slot == PCOLOR_SLOT {
                patch.pcolor.clone()
            } else {
                patch.vars[slot - builtins].clone()
            }
        };
        let mut values = Vec::with_capacity(self.patches.len());
        for patch in &self.patches {
            let value = slot_of(patch);
            let number = value.as_number().ok_or_else(|| AgentError::WrongType {
                variable: name.clone(),
                expected: "number",
                found: value.to_string(),
            })?;
            values.push(number);
        }
        let changed =
            self.topology
                .diffuse(&mut values, &mut self.diffusion_scratch, rate, kernel)?;
        if changed == 0 {
            return Ok(0);
        }
        for (patch, next) in self.patches.iter_mut().zip(values) {
            let target = if slot == PCOLOR_SLOT {
                &mut patch.pcolor
            } else {
                &mut patch.vars[slot - builtins]
            };
            if target.as_number() != Some(next) {
                *target = Value::Number(next);
            }
        }
        self.dirty = true;
        Ok(changed)
    }
}
