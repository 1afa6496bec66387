use crate::error::AgentError;
use crate::program::{Program, Schema};
use crate::world::World;
use std::collections::BTreeMap;
use tracing::info;

/// Agents that lost their breed in a recompilation and were killed afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReallocReport {
    pub doomed_turtles: Vec<i64>,
    pub doomed_links: Vec<i64>,
    /// Global constraints discarded with the old layout; their owner must attach them again.
    pub dropped_constraints: usize,
}

impl ReallocReport {
    #[must_use]
    pub fn doomed(&self) -> usize {
        self.doomed_turtles.len() + self.doomed_links.len()
    }
}

impl World {
    /// Swaps in the layouts of `program` and remaps every live agent in place.
    ///
    /// Values follow their variable names; new variables start at zero. Agents whose
    /// breed vanished, and links whose breed changed direction, are collected first
    /// and killed only after every survivor has been remapped. Global constraints are
    /// not carried over. On error the world is unchanged.
    pub fn recompile(&mut self, program: Program) -> Result<ReallocReport, AgentError> {
        let next = Schema::build(&program, self.topology.is_3d())?;
        let mut plan = self.schema.plan_realloc(&next);
        for breed in next.link_breeds() {
            let flipped = self
                .link_breeds
                .get(&breed.name)
                .and_then(|set| set.is_directed())
                .is_some_and(|directed| directed != breed.directed);
            if flipped {
                plan.links.remove(&breed.name);
            }
        }

        let mut report = ReallocReport::default();
        plan.globals.apply(&mut self.observer.globals);
        report.dropped_constraints = self
            .observer
            .constraints
            .iter()
            .filter(|constraint| constraint.is_some())
            .count();
        self.observer.constraints = vec![None; self.observer.globals.len()];

        if let Some(remap) = &plan.patches {
            for patch in &mut self.patches {
                remap.apply(&mut patch.vars);
            }
        }
        for turtle in self.turtles.values_mut() {
            match plan.turtles.get(&turtle.breed) {
                Some(remap) => remap.apply(&mut turtle.vars),
                None => report.doomed_turtles.push(turtle.id),
            }
        }
        for link in self.links.values_mut() {
            match plan.links.get(&link.breed) {
                Some(remap) => remap.apply(&mut link.vars),
                None => report.doomed_links.push(link.id),
            }
        }

        let (turtle_breeds, link_breeds) = Self::breed_registries(&next);
        self.turtle_breeds = carry_members(&mut self.turtle_breeds, turtle_breeds, |_| true);
        self.link_breeds = carry_members(&mut self.link_breeds, link_breeds, |name| {
            plan.links.contains_key(name)
        });
        self.schema = next;
        self.program = program;

        for id in &report.doomed_links {
            if self.links.contains_key(id) {
                self.kill_link(*id)?;
            }
        }
        for id in &report.doomed_turtles {
            self.die(*id)?;
        }
        self.dirty = true;
        info!(
            doomed_turtles = report.doomed_turtles.len(),
            doomed_links = report.doomed_links.len(),
            dropped_constraints = report.dropped_constraints,
            "world recompiled"
        );
        Ok(report)
    }
}

/// Fresh registries for the new breeds, keeping the members of breeds that survive.
fn carry_members<S>(
    old: &mut BTreeMap<String, S>,
    mut fresh: BTreeMap<String, S>,
    keep: impl Fn(&str) -> bool,
) -> BTreeMap<String, S> {
    for (name, set) in &mut fresh {
        if keep(name) {
            if let Some(previous) = old.remove(name) {
                *set = previous;
            }
        }
    }
    fresh
}
