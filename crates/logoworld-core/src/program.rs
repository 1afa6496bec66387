//! Variable layouts derived from a compiled program, and the remapping that
//! carries live agent state across a recompilation.

use crate::error::AgentError;
use crate::value::{AgentKind, Value};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Name of the default turtle breed, which is the set of all turtles.
pub const TURTLES: &str = "TURTLES";
/// Name of the default link breed, which is the set of all links.
pub const LINKS: &str = "LINKS";
/// Name of the set of all patches.
pub const PATCHES: &str = "PATCHES";

pub const TURTLE_BUILTINS: [&str; 13] = [
    "WHO",
    "COLOR",
    "HEADING",
    "XCOR",
    "YCOR",
    "SHAPE",
    "LABEL",
    "LABEL-COLOR",
    "BREED",
    "HIDDEN?",
    "SIZE",
    "PEN-SIZE",
    "PEN-MODE",
];
pub const TURTLE_BUILTINS_3D: [&str; 3] = ["ZCOR", "PITCH", "ROLL"];
pub const PATCH_BUILTINS: [&str; 5] = ["PXCOR", "PYCOR", "PCOLOR", "PLABEL", "PLABEL-COLOR"];
pub const PATCH_BUILTINS_3D: [&str; 1] = ["PZCOR"];
pub const LINK_BUILTINS: [&str; 10] = [
    "END1",
    "END2",
    "COLOR",
    "LABEL",
    "LABEL-COLOR",
    "HIDDEN?",
    "BREED",
    "THICKNESS",
    "SHAPE",
    "TIE-MODE",
];

/// A breed declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreedDecl {
    pub name: String,
    pub singular: String,
    #[serde(default)]
    pub owns: Vec<String>,
    /// Only meaningful for link breeds.
    #[serde(default)]
    pub directed: bool,
}

/// The variable declarations of a compiled program.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Program {
    pub globals: Vec<String>,
    pub turtles_own: Vec<String>,
    pub patches_own: Vec<String>,
    pub links_own: Vec<String>,
    pub breeds: Vec<BreedDecl>,
    pub link_breeds: Vec<BreedDecl>,
}

fn names<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    items.into_iter().map(Into::into).collect()
}

impl Program {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_globals<I: IntoIterator<Item = S>, S: Into<String>>(mut self, globals: I) -> Self {
        self.globals = names(globals);
        self
    }

    #[must_use]
    pub fn with_turtles_own<I: IntoIterator<Item = S>, S: Into<String>>(mut self, vars: I) -> Self {
        self.turtles_own = names(vars);
        self
    }

    #[must_use]
    pub fn with_patches_own<I: IntoIterator<Item = S>, S: Into<String>>(mut self, vars: I) -> Self {
        self.patches_own = names(vars);
        self
    }

    #[must_use]
    pub fn with_links_own<I: IntoIterator<Item = S>, S: Into<String>>(mut self, vars: I) -> Self {
        self.links_own = names(vars);
        self
    }

    #[must_use]
    pub fn with_breed<I: IntoIterator<Item = S>, S: Into<String>>(
        mut self,
        name: &str,
        singular: &str,
        owns: I,
    ) -> Self {
        self.breeds.push(BreedDecl {
            name: name.to_owned(),
            singular: singular.to_owned(),
            owns: names(owns),
            directed: false,
        });
        self
    }

    #[must_use]
    pub fn with_link_breed<I: IntoIterator<Item = S>, S: Into<String>>(
        mut self,
        name: &str,
        singular: &str,
        directed: bool,
        owns: I,
    ) -> Self {
        self.link_breeds.push(BreedDecl {
            name: name.to_owned(),
            singular: singular.to_owned(),
            owns: names(owns),
            directed,
        });
        self
    }
}

/// Ordered slot names for one agent kind (or one breed). Built-ins come first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Layout {
    names: Vec<String>,
    builtins: usize,
}

impl Layout {
    fn build<'a>(
        kind: AgentKind,
        builtins: &[&str],
        owns: impl IntoIterator<Item = &'a String>,
    ) -> Result<Self, AgentError> {
        let mut names: Vec<String> = builtins.iter().map(|name| (*name).to_owned()).collect();
        let mut seen: HashSet<String> = names.iter().cloned().collect();
        for name in owns {
            let upper = name.to_uppercase();
            if !seen.insert(upper.clone()) {
                return Err(AgentError::invalid(format!(
                    "{kind} variable {upper} is declared twice"
                )));
            }
            names.push(upper);
        }
        Ok(Self {
            names,
            builtins: builtins.len(),
        })
    }

    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Number of leading built-in slots.
    #[must_use]
    pub fn builtin_count(&self) -> usize {
        self.builtins
    }

    /// Number of declared (non built-in) slots.
    #[must_use]
    pub fn own_count(&self) -> usize {
        self.names.len() - self.builtins
    }

    /// Slot index of `name`, matched case-insensitively.
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        let upper = name.to_uppercase();
        self.names.iter().position(|candidate| *candidate == upper)
    }

    #[must_use]
    pub fn name(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }
}

/// Registered breed with its canonical upper-case name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreedInfo {
    pub name: String,
    pub singular: String,
    pub directed: bool,
}

/// Slot layouts for every agent kind, built from a [`Program`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    globals: Layout,
    patches: Layout,
    turtles: BTreeMap<String, Layout>,
    links: BTreeMap<String, Layout>,
    turtle_breeds: Vec<BreedInfo>,
    link_breeds: Vec<BreedInfo>,
}

impl Schema {
    /// Builds the layouts for `program`; volumetric worlds get the extra coordinate slots.
    pub fn build(program: &Program, volumetric: bool) -> Result<Self, AgentError> {
        let mut turtle_builtins: Vec<&str> = TURTLE_BUILTINS.to_vec();
        let mut patch_builtins: Vec<&str> = PATCH_BUILTINS.to_vec();
        if volumetric {
            turtle_builtins.extend(TURTLE_BUILTINS_3D);
            patch_builtins.extend(PATCH_BUILTINS_3D);
        }

        let globals = Layout::build(AgentKind::Observer, &[], &program.globals)?;
        let patches = Layout::build(AgentKind::Patch, &patch_builtins, &program.patches_own)?;

        let mut turtles = BTreeMap::new();
        turtles.insert(
            TURTLES.to_owned(),
            Layout::build(AgentKind::Turtle, &turtle_builtins, &program.turtles_own)?,
        );
        let mut turtle_breeds = Vec::new();
        for breed in &program.breeds {
            let info = Self::register_breed(breed, &turtles, false)?;
            let layout = Layout::build(
                AgentKind::Turtle,
                &turtle_builtins,
                program.turtles_own.iter().chain(&breed.owns),
            )?;
            turtles.insert(info.name.clone(), layout);
            turtle_breeds.push(info);
        }

        let mut links = BTreeMap::new();
        links.insert(
            LINKS.to_owned(),
            Layout::build(AgentKind::Link, &LINK_BUILTINS, &program.links_own)?,
        );
        let mut link_breeds = Vec::new();
        for breed in &program.link_breeds {
            if turtles.contains_key(&breed.name.to_uppercase()) {
                return Err(AgentError::invalid(format!(
                    "breed {} is declared twice",
                    breed.name.to_uppercase()
                )));
            }
            let info = Self::register_breed(breed, &links, breed.directed)?;
            let layout = Layout::build(
                AgentKind::Link,
                &LINK_BUILTINS,
                program.links_own.iter().chain(&breed.owns),
            )?;
            links.insert(info.name.clone(), layout);
            link_breeds.push(info);
        }

        Ok(Self {
            globals,
            patches,
            turtles,
            links,
            turtle_breeds,
            link_breeds,
        })
    }

    fn register_breed(
        decl: &BreedDecl,
        existing: &BTreeMap<String, Layout>,
        directed: bool,
    ) -> Result<BreedInfo, AgentError> {
        let name = decl.name.to_uppercase();
        if name.is_empty() || name == PATCHES || existing.contains_key(&name) {
            return Err(AgentError::invalid(format!(
                "breed {name} is declared twice or uses a reserved name"
            )));
        }
        Ok(BreedInfo {
            name,
            singular: decl.singular.to_uppercase(),
            directed,
        })
    }

    #[must_use]
    pub fn globals(&self) -> &Layout {
        &self.globals
    }

    #[must_use]
    pub fn patches(&self) -> &Layout {
        &self.patches
    }

    /// Layout for turtles of `breed` (`TURTLES` for unbred turtles).
    #[must_use]
    pub fn turtles(&self, breed: &str) -> Option<&Layout> {
        self.turtles.get(breed)
    }

    /// Layout for links of `breed` (`LINKS` for unbred links).
    #[must_use]
    pub fn links(&self, breed: &str) -> Option<&Layout> {
        self.links.get(breed)
    }

    #[must_use]
    pub fn turtle_breeds(&self) -> &[BreedInfo] {
        &self.turtle_breeds
    }

    #[must_use]
    pub fn link_breeds(&self) -> &[BreedInfo] {
        &self.link_breeds
    }

    /// Every turtle slot name across all breeds, in first-declared order.
    #[must_use]
    pub fn all_turtle_names(&self) -> Vec<String> {
        Self::union(&self.turtles, TURTLES, &self.turtle_breeds)
    }

    /// Every link slot name across all breeds, in first-declared order.
    #[must_use]
    pub fn all_link_names(&self) -> Vec<String> {
        Self::union(&self.links, LINKS, &self.link_breeds)
    }

    fn union(layouts: &BTreeMap<String, Layout>, base: &str, breeds: &[BreedInfo]) -> Vec<String> {
        let mut all: Vec<String> = Vec::new();
        let order = std::iter::once(base).chain(breeds.iter().map(|b| b.name.as_str()));
        for breed in order {
            if let Some(layout) = layouts.get(breed) {
                for name in layout.names() {
                    if !all.contains(name) {
                        all.push(name.clone());
                    }
                }
            }
        }
        all
    }

    /// Computes how live agent storage moves from `self` to `next`.
    ///
    /// Pure: neither schema is modified. Breeds missing from `next` are absent
    /// from the plan, and their members are doomed.
    #[must_use]
    pub fn plan_realloc(&self, next: &Schema) -> ReallocPlan {
        let remap_all = |old: &BTreeMap<String, Layout>,
                         new: &BTreeMap<String, Layout>|
         -> BTreeMap<String, Remap> {
            old.iter()
                .filter_map(|(breed, layout)| {
                    new.get(breed)
                        .map(|target| (breed.clone(), Remap::between(layout, target)))
                })
                .collect()
        };
        ReallocPlan {
            globals: Remap::between(&self.globals, &next.globals),
            patches: (self.patches != next.patches)
                .then(|| Remap::between(&self.patches, &next.patches)),
            turtles: remap_all(&self.turtles, &next.turtles),
            links: remap_all(&self.links, &next.links),
        }
    }
}

/// Maps each declared slot of a new layout to the slot holding its value in the old one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Remap {
    sources: Vec<Option<usize>>,
}

impl Remap {
    /// Matches declared slots by name; built-in slots are carried by the agents directly.
    #[must_use]
    pub fn between(old: &Layout, new: &Layout) -> Self {
        let old_own = &old.names()[old.builtin_count()..];
        let sources = new.names()[new.builtin_count()..]
            .iter()
            .map(|name| old_own.iter().position(|candidate| candidate == name))
            .collect();
        Self { sources }
    }

    /// Number of slots produced by [`Remap::apply`].
    #[must_use]
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Returns true when applying the remap would leave `old_len` slots untouched.
    #[must_use]
    pub fn is_identity(&self, old_len: usize) -> bool {
        self.sources.len() == old_len
            && self
                .sources
                .iter()
                .enumerate()
                .all(|(index, source)| *source == Some(index))
    }

    /// Rebuilds `values` in the new order; new slots start at zero, dropped slots vanish.
    pub fn apply(&self, values: &mut Vec<Value>) {
        if self.is_identity(values.len()) {
            return;
        }
        let mut old = std::mem::take(values);
        *values = self
            .sources
            .iter()
            .map(|source| {
                source
                    .and_then(|index| old.get_mut(index).map(std::mem::take))
                    .unwrap_or_default()
            })
            .collect();
    }
}

/// Remapping for every agent kind after a recompilation.
#[derive(Debug, Clone, PartialEq)]
pub struct ReallocPlan {
    pub globals: Remap,
    /// `None` when the patch layout did not change.
    pub patches: Option<Remap>,
    /// Keyed by surviving turtle breed.
    pub turtles: BTreeMap<String, Remap>,
    /// Keyed by surviving link breed.
    pub links: BTreeMap<String, Remap>,
}
