use crate::agentset::ArrayAgentSet;
use crate::error::AgentError;
use crate::patch::DEFAULT_LABEL_COLOR;
use crate::program::LINKS;
use crate::value::{AgentKind, AgentRef, DEAD_ID, Value};
use crate::world::World;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How a link drags its second end when the first end moves or turns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TieMode {
    #[default]
    None,
    /// Rope: the tied turtle is translated but keeps its own orientation.
    Free,
    /// Rigid: the tied turtle is also rotated with the root.
    Fixed,
}

impl TieMode {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TieMode::None => "none",
            TieMode::Free => "free",
            TieMode::Fixed => "fixed",
        }
    }

    #[must_use]
    pub fn is_tied(&self) -> bool {
        *self != TieMode::None
    }
}

impl fmt::Display for TieMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TieMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(TieMode::None),
            "free" => Ok(TieMode::Free),
            "fixed" => Ok(TieMode::Fixed),
            other => Err(format!("{other} is not a valid tie mode")),
        }
    }
}

/// A relation between two turtles. Undirected links store the lower id as `end1`.
#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    pub(crate) id: i64,
    pub(crate) end1: i64,
    pub(crate) end2: i64,
    pub(crate) breed: String,
    pub(crate) directed: bool,
    pub(crate) color: Value,
    pub(crate) label: Value,
    pub(crate) label_color: Value,
    pub(crate) hidden: bool,
    pub(crate) thickness: f64,
    pub(crate) shape: String,
    pub(crate) tie_mode: TieMode,
    pub(crate) vars: Vec<Value>,
}

impl Link {
    #[must_use]
    pub fn id(&self) -> i64 {
        self.id
    }

    #[must_use]
    pub fn end1(&self) -> i64 {
        self.end1
    }

    #[must_use]
    pub fn end2(&self) -> i64 {
        self.end2
    }

    /// Upper-case breed name; `LINKS` for unbred links.
    #[must_use]
    pub fn breed(&self) -> &str {
        &self.breed
    }

    #[must_use]
    pub fn is_directed(&self) -> bool {
        self.directed
    }

    #[must_use]
    pub fn color(&self) -> &Value {
        &self.color
    }

    #[must_use]
    pub fn label(&self) -> &Value {
        &self.label
    }

    #[must_use]
    pub fn label_color(&self) -> &Value {
        &self.label_color
    }

    #[must_use]
    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    #[must_use]
    pub fn thickness(&self) -> f64 {
        self.thickness
    }

    #[must_use]
    pub fn shape(&self) -> &str {
        &self.shape
    }

    #[must_use]
    pub fn tie_mode(&self) -> TieMode {
        self.tie_mode
    }

    #[must_use]
    pub fn vars(&self) -> &[Value] {
        &self.vars
    }

    /// The endpoint opposite `turtle`, or `None` if `turtle` is not an endpoint.
    #[must_use]
    pub fn other_end(&self, turtle: i64) -> Option<i64> {
        if turtle == self.end1 {
            Some(self.end2)
        } else if turtle == self.end2 {
            Some(self.end1)
        } else {
            None
        }
    }
}

impl World {
    /// Creates an undirected link between `a` and `b`, or returns the existing one.
    pub fn create_link_with(&mut self, a: i64, b: i64, breed: &str) -> Result<i64, AgentError> {
        self.get_or_create_link(a, b, breed, false)
    }

    /// Creates a directed link from `from` to `to`, or returns the existing one.
    pub fn create_link_to(&mut self, from: i64, to: i64, breed: &str) -> Result<i64, AgentError> {
        self.get_or_create_link(from, to, breed, true)
    }

    /// Returns the link of `breed` between the two turtles, creating it when absent.
    ///
    /// A breed's directedness is fixed by its declaration; unbred links take theirs
    /// from the first unbred link created.
    pub fn get_or_create_link(
        &mut self,
        end1: i64,
        end2: i64,
        breed: &str,
        directed: bool,
    ) -> Result<i64, AgentError> {
        self.make_link(None, end1, end2, breed, directed)
    }

    /// Recreates a link under a recorded id, for importers that replay an exported world.
    pub fn restore_link(
        &mut self,
        id: i64,
        end1: i64,
        end2: i64,
        breed: &str,
        directed: bool,
    ) -> Result<i64, AgentError> {
        if id < 0 {
            return Err(AgentError::NoSuchAgent {
                kind: AgentKind::Link,
                id,
            });
        }
        self.make_link(Some(id), end1, end2, breed, directed)
    }

    fn make_link(
        &mut self,
        id: Option<i64>,
        end1: i64,
        end2: i64,
        breed: &str,
        directed: bool,
    ) -> Result<i64, AgentError> {
        self.check_alive(AgentRef::Turtle(end1))?;
        self.check_alive(AgentRef::Turtle(end2))?;
        if end1 == end2 {
            return Err(AgentError::invalid("a turtle cannot link with itself"));
        }
        let breed = breed.to_uppercase();
        let own_count = self
            .schema
            .links(&breed)
            .ok_or_else(|| AgentError::NoSuchBreed(breed.clone()))?
            .own_count();
        let settled = if breed == LINKS {
            self.links_directed
        } else {
            self.link_breeds
                .get(&breed)
                .and_then(|set| set.is_directed())
        };
        if settled.is_some_and(|settled| settled != directed) {
            return Err(AgentError::invalid(format!(
                "{breed} is {}directed",
                if directed { "un" } else { "" }
            )));
        }
        let (end1, end2) = if directed || end1 < end2 {
            (end1, end2)
        } else {
            (end2, end1)
        };
        let key = (end1, end2, breed.clone());
        if let Some(existing) = self.link_index.get(&key) {
            return Ok(*existing);
        }
        let id = id.unwrap_or(self.next_link_id);
        self.insert_link(Link {
            id,
            end1,
            end2,
            breed,
            directed,
            color: Value::Number(5.0),
            label: Value::Str(String::new()),
            label_color: Value::Number(DEFAULT_LABEL_COLOR),
            hidden: false,
            thickness: 0.0,
            shape: "default".to_owned(),
            tie_mode: TieMode::None,
            vars: vec![Value::default(); own_count],
        })
    }

    pub(crate) fn insert_link(&mut self, link: Link) -> Result<i64, AgentError> {
        let id = link.id;
        if self.links.contains_key(&id) {
            return Err(AgentError::Corrupted(format!("link {id} registered twice")));
        }
        for end in [link.end1, link.end2] {
            self.turtle_mut(end)?.links.insert(id);
        }
        if link.breed == LINKS {
            self.links_directed = Some(link.directed);
        } else if let Some(set) = self.link_breeds.get_mut(&link.breed) {
            set.insert(id)?;
        }
        if link.tie_mode.is_tied() {
            self.tie_count += 1;
        }
        self.link_index
            .insert((link.end1, link.end2, link.breed.clone()), id);
        self.links.insert(id, link);
        self.next_link_id = self.next_link_id.max(id + 1);
        self.dirty = true;
        Ok(id)
    }

    /// Link of `breed` from `end1` to `end2`; undirected links match either way round.
    #[must_use]
    pub fn find_link(&self, end1: i64, end2: i64, breed: &str) -> Option<i64> {
        let breed = breed.to_uppercase();
        self.link_index
            .get(&(end1, end2, breed.clone()))
            .or_else(|| self.link_index.get(&(end2, end1, breed)))
            .copied()
            .filter(|id| {
                self.links
                    .get(id)
                    .is_some_and(|link| !link.directed || link.end1 == end1)
            })
    }

    /// Kills a link, returning the corpse with id `-1`.
    pub fn kill_link(&mut self, id: i64) -> Result<Link, AgentError> {
        let mut link = self
            .links
            .remove(&id)
            .ok_or(AgentError::dead(AgentKind::Link))?;
        self.link_index
            .remove(&(link.end1, link.end2, link.breed.clone()));
        for end in [link.end1, link.end2] {
            if let Some(turtle) = self.turtles.get_mut(&end) {
                turtle.links.remove(&id);
            }
        }
        if let Some(set) = self.link_breeds.get_mut(&link.breed) {
            set.remove(id);
        }
        // The last plain link frees the choice of directedness.
        if link.breed == LINKS && !self.links.values().any(|other| other.breed == LINKS) {
            self.links_directed = None;
        }
        if link.tie_mode.is_tied() {
            self.tie_count = self.tie_count.saturating_sub(1);
        }
        if self.observer.target() == Some(AgentRef::Link(id)) {
            self.observer.reset_perspective(self.topology.bounds());
        }
        link.id = DEAD_ID;
        self.dirty = true;
        Ok(link)
    }

    pub fn set_tie_mode(&mut self, id: i64, mode: TieMode) -> Result<(), AgentError> {
        let link = self
            .links
            .get_mut(&id)
            .ok_or(AgentError::dead(AgentKind::Link))?;
        let before = link.tie_mode.is_tied();
        link.tie_mode = mode;
        match (before, mode.is_tied()) {
            (false, true) => self.tie_count += 1,
            (true, false) => self.tie_count = self.tie_count.saturating_sub(1),
            _ => {}
        }
        Ok(())
    }

    /// Ties a link rigidly.
    pub fn tie(&mut self, id: i64) -> Result<(), AgentError> {
        self.set_tie_mode(id, TieMode::Fixed)
    }

    pub fn untie(&mut self, id: i64) -> Result<(), AgentError> {
        self.set_tie_mode(id, TieMode::None)
    }

    /// Wrap-aware distance between the two ends.
    pub fn link_length(&self, id: i64) -> Result<f64, AgentError> {
        let link = self.link(id)?;
        let from = self.turtle(link.end1)?.position;
        let to = self.turtle(link.end2)?.position;
        Ok(self.topology.distance(from, to))
    }

    /// Heading from `end1` to `end2`; fails when both ends share a point.
    pub fn link_heading(&self, id: i64) -> Result<f64, AgentError> {
        let link = self.link(id)?;
        let from = self.turtle(link.end1)?.position;
        let to = self.turtle(link.end2)?.position;
        Ok(self.topology.towards(from, to)?)
    }

    pub fn other_end(&self, link: i64, turtle: i64) -> Result<i64, AgentError> {
        self.link(link)?.other_end(turtle).ok_or_else(|| {
            AgentError::invalid(format!("turtle {turtle} is not an end of link {link}"))
        })
    }

    /// Links attached to `turtle`, in id order.
    pub fn my_links(&self, turtle: i64) -> Result<ArrayAgentSet, AgentError> {
        ArrayAgentSet::from_agents(
            AgentKind::Link,
            self.turtle(turtle)?.links.iter().copied().map(AgentRef::Link),
        )
    }

    /// Turtles at the far end of the links attached to `turtle`.
    pub fn link_neighbors(&self, turtle: i64) -> Result<ArrayAgentSet, AgentError> {
        let mut neighbors = Vec::new();
        for id in &self.turtle(turtle)?.links {
            if let Some(other) = self.link(*id)?.other_end(turtle) {
                neighbors.push(AgentRef::Turtle(other));
            }
        }
        ArrayAgentSet::from_agents(AgentKind::Turtle, neighbors)
    }
}
