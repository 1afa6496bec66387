use crate::agentset::{AgentSet, ArrayAgentSet, TreeAgentSet};
use crate::config::WorldConfig;
use crate::drawing::Drawing;
use crate::error::AgentError;
use crate::link::Link;
use crate::observer::{Observer, Perspective};
use crate::patch::Patch;
use crate::program::{LINKS, PATCHES, Program, Schema, TURTLES};
use crate::turtle::Turtle;
use crate::value::{AgentKind, AgentRef, Value};
use crate::watch::{WatchCallback, WatcherKey, Watchers};
use logoworld_topology::{Topology, WorldBounds};
use rand::{Rng, SeedableRng, rngs::SmallRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::info;

/// Position of the main random stream: the seed it started from and how many
/// 32-bit words it has produced since.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RandomState {
    pub seed: u64,
    pub word_pos: u128,
}

/// Registry key of a link: ordered endpoints plus breed.
pub(crate) type LinkKey = (i64, i64, String);

/// A complete agent world: geometry, agents, registries and random streams.
///
/// All mutation goes through `&mut World`, so a single job stream owns the world
/// while it runs and renderers read through [`World::view`].
pub struct World {
    pub(crate) config: WorldConfig,
    pub(crate) topology: Topology,
    pub(crate) program: Program,
    pub(crate) schema: Schema,
    pub(crate) observer: Observer,
    pub(crate) patches: Vec<Patch>,
    pub(crate) turtles: BTreeMap<i64, Turtle>,
    pub(crate) links: BTreeMap<i64, Link>,
    pub(crate) link_index: HashMap<LinkKey, i64>,
    pub(crate) turtle_breeds: BTreeMap<String, TreeAgentSet>,
    pub(crate) link_breeds: BTreeMap<String, TreeAgentSet>,
    /// Directedness of unbred links, settled by the first one created.
    pub(crate) links_directed: Option<bool>,
    pub(crate) next_turtle_id: i64,
    pub(crate) next_link_id: i64,
    pub(crate) drawing: Drawing,
    pub(crate) watchers: Watchers,
    /// Number of live links whose tie mode is not `none`.
    pub(crate) tie_count: usize,
    pub(crate) diffusion_scratch: Vec<f64>,
    pub(crate) dirty: bool,
    rng: ChaCha8Rng,
    aux_rng: SmallRng,
    seed: u64,
    ticks: Option<f64>,
}

impl fmt::Debug for World {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("World")
            .field("config", &self.config)
            .field("topology", &self.topology.kind())
            .field("seed", &self.seed)
            .field("ticks", &self.ticks)
            .field("turtles", &self.turtles.len())
            .field("patches", &self.patches.len())
            .field("links", &self.links.len())
            .finish()
    }
}

impl World {
    /// Builds a world with no declared variables or breeds.
    pub fn new(config: WorldConfig) -> Result<Self, AgentError> {
        Self::with_program(config, Program::default())
    }

    /// Builds a world whose variable layouts come from `program`.
    pub fn with_program(config: WorldConfig, program: Program) -> Result<Self, AgentError> {
        config.validate()?;
        let topology = Topology::new(config.bounds, config.wrap_x, config.wrap_y)?;
        let schema = Schema::build(&program, topology.is_3d())?;
        let seed = config.resolved_seed();
        let observer = Observer::new(schema.globals().own_count(), &config.bounds);
        let patches = Patch::build_all(&topology, &schema);
        let (turtle_breeds, link_breeds) = Self::breed_registries(&schema);
        info!(
            kind = ?topology.kind(),
            patches = patches.len(),
            seed,
            "world created"
        );
        Ok(Self {
            config,
            topology,
            program,
            schema,
            observer,
            patches,
            turtles: BTreeMap::new(),
            links: BTreeMap::new(),
            link_index: HashMap::new(),
            turtle_breeds,
            link_breeds,
            links_directed: None,
            next_turtle_id: 0,
            next_link_id: 0,
            drawing: Drawing::default(),
            watchers: Watchers::default(),
            tie_count: 0,
            diffusion_scratch: Vec::new(),
            dirty: true,
            rng: ChaCha8Rng::seed_from_u64(seed),
            aux_rng: WorldConfig::aux_rng(),
            seed,
            ticks: None,
        })
    }

    pub(crate) fn breed_registries(
        schema: &Schema,
    ) -> (BTreeMap<String, TreeAgentSet>, BTreeMap<String, TreeAgentSet>) {
        let turtles = schema
            .turtle_breeds()
            .iter()
            .map(|breed| {
                (
                    breed.name.clone(),
                    TreeAgentSet::new(AgentKind::Turtle, breed.name.clone()),
                )
            })
            .collect();
        let links = schema
            .link_breeds()
            .iter()
            .map(|breed| {
                (
                    breed.name.clone(),
                    TreeAgentSet::directed(breed.name.clone(), breed.directed),
                )
            })
            .collect();
        (turtles, links)
    }

    #[must_use]
    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    #[must_use]
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    #[must_use]
    pub fn bounds(&self) -> &WorldBounds {
        self.topology.bounds()
    }

    #[must_use]
    pub fn is_3d(&self) -> bool {
        self.topology.is_3d()
    }

    #[must_use]
    pub fn program(&self) -> &Program {
        &self.program
    }

    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    #[must_use]
    pub fn observer(&self) -> &Observer {
        &self.observer
    }

    pub fn observer_mut(&mut self) -> &mut Observer {
        &mut self.observer
    }

    /// Seed the main stream was last started from.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Main random stream; every draw here affects simulation outcome.
    pub fn rng(&mut self) -> &mut ChaCha8Rng {
        &mut self.rng
    }

    /// Restarts the main stream from `seed`.
    pub fn reseed(&mut self, seed: u64) {
        self.seed = seed;
        self.rng = ChaCha8Rng::seed_from_u64(seed);
    }

    #[must_use]
    pub fn random_state(&self) -> RandomState {
        RandomState {
            seed: self.seed,
            word_pos: self.rng.get_word_pos(),
        }
    }

    /// Puts the main stream back where [`World::random_state`] found it.
    pub fn restore_random_state(&mut self, state: RandomState) {
        self.reseed(state.seed);
        self.rng.set_word_pos(state.word_pos);
    }

    /// Uniform draw in `[0, 1)` from the auxiliary stream, which the simulation never reads.
    pub fn random_aux(&mut self) -> f64 {
        self.aux_rng.random()
    }

    #[must_use]
    pub fn is_alive(&self, agent: AgentRef) -> bool {
        match agent {
            AgentRef::Observer => true,
            AgentRef::Turtle(id) => self.turtles.contains_key(&id),
            AgentRef::Patch(index) => index < self.patches.len(),
            AgentRef::Link(id) => self.links.contains_key(&id),
        }
    }

    /// Fails with a condition naming the agent's kind when it has died.
    pub fn check_alive(&self, agent: AgentRef) -> Result<(), AgentError> {
        if self.is_alive(agent) {
            Ok(())
        } else {
            Err(AgentError::dead(agent.kind()))
        }
    }

    pub fn turtle_ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.turtles.keys().copied()
    }

    #[must_use]
    pub fn turtle_count(&self) -> usize {
        self.turtles.len()
    }

    pub fn turtle(&self, id: i64) -> Result<&Turtle, AgentError> {
        self.turtles
            .get(&id)
            .ok_or(AgentError::dead(AgentKind::Turtle))
    }

    pub(crate) fn turtle_mut(&mut self, id: i64) -> Result<&mut Turtle, AgentError> {
        self.turtles
            .get_mut(&id)
            .ok_or(AgentError::dead(AgentKind::Turtle))
    }

    pub fn turtles(&self) -> impl Iterator<Item = &Turtle> + '_ {
        self.turtles.values()
    }

    #[must_use]
    pub fn patch_count(&self) -> usize {
        self.patches.len()
    }

    pub fn patch(&self, index: usize) -> Result<&Patch, AgentError> {
        self.patches.get(index).ok_or(AgentError::NoSuchAgent {
            kind: AgentKind::Patch,
            id: i64::try_from(index).unwrap_or(i64::MAX),
        })
    }

    #[must_use]
    pub fn patches(&self) -> &[Patch] {
        &self.patches
    }

    pub fn link_ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.links.keys().copied()
    }

    #[must_use]
    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    pub fn link(&self, id: i64) -> Result<&Link, AgentError> {
        self.links.get(&id).ok_or(AgentError::dead(AgentKind::Link))
    }

    pub fn links(&self) -> impl Iterator<Item = &Link> + '_ {
        self.links.values()
    }

    #[must_use]
    pub fn turtle_breed(&self, name: &str) -> Option<&TreeAgentSet> {
        self.turtle_breeds.get(name)
    }

    #[must_use]
    pub fn link_breed(&self, name: &str) -> Option<&TreeAgentSet> {
        self.link_breeds.get(name)
    }

    /// Returns true when `name` is a declared turtle or link breed.
    #[must_use]
    pub fn is_breed(&self, name: &str) -> bool {
        let upper = name.to_uppercase();
        self.turtle_breeds.contains_key(&upper) || self.link_breeds.contains_key(&upper)
    }

    /// Live agentset named `name`: a breed or one of the three global sets.
    pub fn breed(&self, name: &str) -> Result<AgentSet, AgentError> {
        let upper = name.to_uppercase();
        match upper.as_str() {
            TURTLES => Ok(AgentSet::Turtles),
            PATCHES => Ok(AgentSet::Patches),
            LINKS => Ok(AgentSet::Links),
            _ if self.turtle_breeds.contains_key(&upper) => Ok(AgentSet::TurtleBreed(upper)),
            _ if self.link_breeds.contains_key(&upper) => Ok(AgentSet::LinkBreed(upper)),
            _ => Err(AgentError::NoSuchBreed(upper)),
        }
    }

    /// Random live member of `set`, drawn from the main stream.
    pub fn one_of(&mut self, set: &AgentSet) -> Option<AgentRef> {
        let members = set.members(self);
        if members.is_empty() {
            return None;
        }
        let pick = self.rng.random_range(0..members.len());
        Some(members[pick])
    }

    /// `n` distinct random members of `set`, kept in the set's forward order.
    pub fn n_of(&mut self, n: usize, set: &AgentSet) -> Result<ArrayAgentSet, AgentError> {
        let members = set.members(self);
        if n > members.len() {
            return Err(AgentError::invalid(format!(
                "requested {n} random agents from a set of only {} agents",
                members.len()
            )));
        }
        let mut picks = rand::seq::index::sample(&mut self.rng, members.len(), n).into_vec();
        picks.sort_unstable();
        ArrayAgentSet::from_agents(set.kind(), picks.into_iter().map(|index| members[index]))
    }

    #[must_use]
    pub fn ticks(&self) -> Option<f64> {
        self.ticks
    }

    pub fn reset_ticks(&mut self) {
        self.ticks = Some(0.0);
    }

    pub fn clear_ticks(&mut self) {
        self.ticks = None;
    }

    /// Advances the tick counter by one.
    pub fn tick(&mut self) -> Result<f64, AgentError> {
        self.tick_advance(1.0)
    }

    pub fn tick_advance(&mut self, amount: f64) -> Result<f64, AgentError> {
        if amount < 0.0 {
            return Err(AgentError::invalid("cannot advance the tick counter backwards"));
        }
        let ticks = self.ticks.as_mut().ok_or_else(|| {
            AgentError::invalid("the tick counter has not been started yet; use reset-ticks")
        })?;
        *ticks += amount;
        self.dirty = true;
        Ok(*ticks)
    }

    pub fn clear_all(&mut self) {
        self.clear_globals();
        self.clear_ticks();
        self.clear_turtles();
        self.clear_patches();
        self.clear_links();
        self.clear_drawing();
        self.observer.reset_perspective(self.topology.bounds());
        info!("world cleared");
    }

    /// Resets every global to its constraint default, or zero when unconstrained.
    pub fn clear_globals(&mut self) {
        let observer = &mut self.observer;
        for (slot, constraint) in observer.globals.iter_mut().zip(&observer.constraints) {
            *slot = constraint
                .as_ref()
                .map_or_else(Value::default, |constraint| constraint.default_value());
        }
    }

    /// Kills every turtle (and so every link) and restarts turtle numbering at zero.
    pub fn clear_turtles(&mut self) {
        self.clear_links();
        self.turtles.clear();
        for patch in &mut self.patches {
            patch.turtles_here.clear();
        }
        for breed in self.turtle_breeds.values_mut() {
            breed.clear();
        }
        self.next_turtle_id = 0;
        if matches!(self.observer.target(), Some(AgentRef::Turtle(_))) {
            self.observer.reset_perspective(self.topology.bounds());
        }
        self.dirty = true;
    }

    pub fn clear_links(&mut self) {
        self.links.clear();
        self.link_index.clear();
        for breed in self.link_breeds.values_mut() {
            breed.clear();
        }
        for turtle in self.turtles.values_mut() {
            turtle.links.clear();
        }
        self.links_directed = None;
        self.tie_count = 0;
        self.next_link_id = 0;
        if matches!(self.observer.target(), Some(AgentRef::Link(_))) {
            self.observer.reset_perspective(self.topology.bounds());
        }
        self.dirty = true;
    }

    /// Restores every patch's built-in and declared variables to their defaults.
    pub fn clear_patches(&mut self) {
        for patch in &mut self.patches {
            patch.reset();
        }
        self.dirty = true;
    }

    pub fn clear_drawing(&mut self) {
        self.drawing.clear();
        self.dirty = true;
    }

    #[must_use]
    pub fn drawing(&self) -> &Drawing {
        &self.drawing
    }

    /// Replaces the world's bounds, recreating every patch and killing every turtle and link.
    ///
    /// Nothing changes unless the new bounds and the resulting layouts are valid.
    pub fn resize(&mut self, bounds: WorldBounds) -> Result<(), AgentError> {
        let topology = Topology::new(bounds, self.config.wrap_x, self.config.wrap_y)?;
        let schema = if topology.is_3d() == self.topology.is_3d() {
            self.schema.clone()
        } else {
            Schema::build(&self.program, topology.is_3d())?
        };
        self.clear_turtles();
        self.patches = Patch::build_all(&topology, &schema);
        self.schema = schema;
        self.topology = topology;
        self.config.bounds = bounds;
        self.diffusion_scratch.clear();
        self.observer.reset_perspective(&bounds);
        self.dirty = true;
        info!(
            kind = ?self.topology.kind(),
            patches = self.patches.len(),
            "world resized"
        );
        Ok(())
    }

    /// Points the observer at `target`, which must be alive; `Observe` clears the target.
    pub fn set_perspective(
        &mut self,
        perspective: Perspective,
        target: Option<AgentRef>,
    ) -> Result<(), AgentError> {
        if perspective == Perspective::Observe {
            self.observer.set_perspective(perspective, None);
            return Ok(());
        }
        let target = target.ok_or_else(|| {
            AgentError::invalid(format!("perspective {perspective:?} needs a target agent"))
        })?;
        self.check_alive(target)?;
        self.observer.set_perspective(perspective, Some(target));
        if let AgentRef::Turtle(id) = target {
            let turtle = self.turtle(id)?;
            let (position, heading, pitch, roll) =
                (turtle.position, turtle.heading, turtle.pitch, turtle.roll);
            self.observer.track(position, heading, pitch, roll);
        }
        Ok(())
    }

    pub fn reset_perspective(&mut self) {
        self.observer.reset_perspective(self.topology.bounds());
    }

    /// Subscribes `callback` to every successful set of the variable `name`.
    pub fn add_watcher(&mut self, name: &str, callback: WatchCallback) -> WatcherKey {
        self.watchers.add(name, callback)
    }

    pub fn remove_watcher(&mut self, key: WatcherKey) -> bool {
        self.watchers.remove(key)
    }

    pub fn remove_watchers(&mut self, name: &str) -> usize {
        self.watchers.remove_all(name)
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Clears the dirty flag once a renderer has consumed a view.
    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    pub(crate) fn notify_watchers(&mut self, agent: AgentRef, name: &str, value: &Value) {
        if self.watchers.is_watched(name) {
            self.watchers.notify(agent, name, value);
        }
    }
}
