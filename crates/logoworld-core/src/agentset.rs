//! Agent collections: immutable snapshots for query results, live id-ordered
//! registries for the global and breed sets, and the seeded shuffling iterator.

use crate::error::AgentError;
use crate::program::{LINKS, PATCHES, TURTLES};
use crate::value::{AgentKind, AgentRef};
use crate::world::World;
use rand::Rng;
use std::collections::{BTreeSet, HashSet};

/// Immutable snapshot of agents in discovery order, without duplicates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayAgentSet {
    kind: AgentKind,
    agents: Vec<AgentRef>,
}

impl ArrayAgentSet {
    /// Empty set of `kind`.
    #[must_use]
    pub fn empty(kind: AgentKind) -> Self {
        Self {
            kind,
            agents: Vec::new(),
        }
    }

    /// Collects `agents`, dropping repeats and rejecting agents of another kind.
    pub fn from_agents(
        kind: AgentKind,
        agents: impl IntoIterator<Item = AgentRef>,
    ) -> Result<Self, AgentError> {
        let mut seen = HashSet::new();
        let mut unique = Vec::new();
        for agent in agents {
            if agent.kind() != kind {
                return Err(AgentError::invalid(format!(
                    "a {kind} agentset cannot contain {agent}"
                )));
            }
            if seen.insert(agent) {
                unique.push(agent);
            }
        }
        Ok(Self {
            kind,
            agents: unique,
        })
    }

    #[must_use]
    pub fn kind(&self) -> AgentKind {
        self.kind
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    #[must_use]
    pub fn contains(&self, agent: AgentRef) -> bool {
        self.agents.contains(&agent)
    }

    /// Members in discovery order, including any that died since the snapshot was taken.
    #[must_use]
    pub fn as_slice(&self) -> &[AgentRef] {
        &self.agents
    }
}

/// Live registry keyed by id, iterated in ascending id order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeAgentSet {
    kind: AgentKind,
    name: String,
    directed: Option<bool>,
    ids: BTreeSet<i64>,
}

impl TreeAgentSet {
    #[must_use]
    pub fn new(kind: AgentKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            directed: None,
            ids: BTreeSet::new(),
        }
    }

    /// Link registry whose directedness is fixed up front.
    #[must_use]
    pub fn directed(name: impl Into<String>, directed: bool) -> Self {
        Self {
            directed: Some(directed),
            ..Self::new(AgentKind::Link, name)
        }
    }

    #[must_use]
    pub fn kind(&self) -> AgentKind {
        self.kind
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directedness of a link breed registry; `None` for turtle registries.
    #[must_use]
    pub fn is_directed(&self) -> Option<bool> {
        self.directed
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    #[must_use]
    pub fn contains(&self, id: i64) -> bool {
        self.ids.contains(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = i64> + '_ {
        self.ids.iter().copied()
    }

    /// Registers `id`; a second registration means the registry is corrupted.
    pub fn insert(&mut self, id: i64) -> Result<(), AgentError> {
        if self.ids.insert(id) {
            Ok(())
        } else {
            Err(AgentError::Corrupted(format!(
                "{} {id} registered twice in {}",
                self.kind, self.name
            )))
        }
    }

    pub fn remove(&mut self, id: i64) -> bool {
        self.ids.remove(&id)
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }
}

/// An agentset value: either a snapshot or a view of one of the world's live registries.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentSet {
    Array(ArrayAgentSet),
    Turtles,
    Patches,
    Links,
    TurtleBreed(String),
    LinkBreed(String),
}

/// Membership test prepared once for a scan over many candidates.
#[derive(Debug, Clone)]
pub(crate) enum Membership {
    All,
    TurtleBreed(String),
    LinkBreed(String),
    Ids(HashSet<AgentRef>),
}

impl Membership {
    pub(crate) fn admits(&self, world: &World, agent: AgentRef) -> bool {
        match (self, agent) {
            (Membership::All, _) => true,
            (Membership::TurtleBreed(breed), AgentRef::Turtle(id)) => world
                .turtle(id)
                .is_ok_and(|turtle| turtle.breed() == breed),
            (Membership::LinkBreed(breed), AgentRef::Link(id)) => {
                world.link(id).is_ok_and(|link| link.breed() == breed)
            }
            (Membership::Ids(ids), agent) => ids.contains(&agent),
            _ => false,
        }
    }
}

impl AgentSet {
    /// Snapshot of explicit agents.
    pub fn of(kind: AgentKind, agents: impl IntoIterator<Item = AgentRef>) -> Result<Self, AgentError> {
        Ok(AgentSet::Array(ArrayAgentSet::from_agents(kind, agents)?))
    }

    #[must_use]
    pub fn kind(&self) -> AgentKind {
        match self {
            AgentSet::Array(set) => set.kind(),
            AgentSet::Turtles | AgentSet::TurtleBreed(_) => AgentKind::Turtle,
            AgentSet::Patches => AgentKind::Patch,
            AgentSet::Links | AgentSet::LinkBreed(_) => AgentKind::Link,
        }
    }

    /// Returns true for breed sets other than the all-turtles and all-links sets.
    #[must_use]
    pub fn is_breed(&self) -> bool {
        matches!(self, AgentSet::TurtleBreed(_) | AgentSet::LinkBreed(_))
    }

    /// Name the set prints as.
    #[must_use]
    pub fn printname(&self) -> &str {
        match self {
            AgentSet::Array(_) => "",
            AgentSet::Turtles => TURTLES,
            AgentSet::Patches => PATCHES,
            AgentSet::Links => LINKS,
            AgentSet::TurtleBreed(name) | AgentSet::LinkBreed(name) => name,
        }
    }

    /// Live members in forward order: ascending id for registries, discovery order for snapshots.
    #[must_use]
    pub fn members(&self, world: &World) -> Vec<AgentRef> {
        match self {
            AgentSet::Array(set) => set
                .as_slice()
                .iter()
                .copied()
                .filter(|agent| world.is_alive(*agent))
                .collect(),
            AgentSet::Turtles => world.turtle_ids().map(AgentRef::Turtle).collect(),
            AgentSet::Patches => (0..world.patch_count()).map(AgentRef::Patch).collect(),
            AgentSet::Links => world.link_ids().map(AgentRef::Link).collect(),
            AgentSet::TurtleBreed(name) => world
                .turtle_breed(name)
                .map(|set| set.iter().map(AgentRef::Turtle).collect())
                .unwrap_or_default(),
            AgentSet::LinkBreed(name) => world
                .link_breed(name)
                .map(|set| set.iter().map(AgentRef::Link).collect())
                .unwrap_or_default(),
        }
    }

    #[must_use]
    pub fn count(&self, world: &World) -> usize {
        match self {
            AgentSet::Array(set) => set
                .as_slice()
                .iter()
                .filter(|agent| world.is_alive(**agent))
                .count(),
            AgentSet::Turtles => world.turtle_count(),
            AgentSet::Patches => world.patch_count(),
            AgentSet::Links => world.link_count(),
            AgentSet::TurtleBreed(name) => world.turtle_breed(name).map_or(0, TreeAgentSet::len),
            AgentSet::LinkBreed(name) => world.link_breed(name).map_or(0, TreeAgentSet::len),
        }
    }

    #[must_use]
    pub fn is_empty(&self, world: &World) -> bool {
        self.count(world) == 0
    }

    #[must_use]
    pub fn contains(&self, world: &World, agent: AgentRef) -> bool {
        world.is_alive(agent)
            && agent.kind() == self.kind()
            && self.membership().admits(world, agent)
    }

    pub(crate) fn membership(&self) -> Membership {
        match self {
            AgentSet::Array(set) => Membership::Ids(set.as_slice().iter().copied().collect()),
            AgentSet::Turtles | AgentSet::Patches | AgentSet::Links => Membership::All,
            AgentSet::TurtleBreed(name) => Membership::TurtleBreed(name.clone()),
            AgentSet::LinkBreed(name) => Membership::LinkBreed(name.clone()),
        }
    }

    /// Randomized iteration over a copy of the current members.
    #[must_use]
    pub fn shufflerator(&self, world: &World) -> Shufflerator {
        Shufflerator::new(self.members(world))
    }
}

/// Seeded random-order iterator.
///
/// Each step swaps a uniformly chosen remaining agent into the next position,
/// drawing from the supplied RNG lazily, so for a given seed and member list
/// the order is exactly reproducible. The RNG is passed per step so callers can
/// interleave other uses of the world between steps.
#[derive(Debug, Clone)]
pub struct Shufflerator {
    agents: Vec<AgentRef>,
    index: usize,
}

impl Shufflerator {
    #[must_use]
    pub fn new(agents: Vec<AgentRef>) -> Self {
        Self { agents, index: 0 }
    }

    /// Next agent; no random number is drawn for the final one.
    pub fn next_with<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<AgentRef> {
        let len = self.agents.len();
        if self.index >= len {
            return None;
        }
        if self.index < len - 1 {
            let pick = rng.random_range(self.index..len);
            self.agents.swap(self.index, pick);
        }
        let agent = self.agents[self.index];
        self.index += 1;
        Some(agent)
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.agents.len() - self.index
    }

    /// Runs the shuffle to completion.
    pub fn collect_with<R: Rng + ?Sized>(mut self, rng: &mut R) -> Vec<AgentRef> {
        let mut order = Vec::with_capacity(self.remaining());
        while let Some(agent) = self.next_with(rng) {
            order.push(agent);
        }
        order
    }
}
