//! Agent world substrate for LogoWorld.
//!
//! A [`World`] owns the patches, turtles and links of one model together with the
//! variable layouts compiled from a [`Program`], the breed registries, the drawing
//! surface and the seeded random streams. Geometry is delegated to
//! [`logoworld_topology`]; job scheduling lives in `logoworld-job`.

mod agentset;
mod config;
mod drawing;
mod error;
mod link;
mod observer;
mod patch;
mod program;
mod realloc;
mod spatial;
mod ties;
mod turtle;
mod value;
mod variables;
mod view;
mod watch;
mod world;

pub use agentset::{AgentSet, ArrayAgentSet, Shufflerator, TreeAgentSet};
pub use config::WorldConfig;
pub use drawing::{Drawing, DrawingLine, PenMode};
pub use error::AgentError;
pub use link::{Link, TieMode};
pub use observer::{Observer, Perspective};
pub use patch::Patch;
pub use program::{
    BreedDecl, BreedInfo, LINKS, Layout, PATCHES, Program, ReallocPlan, Remap, Schema, TURTLES,
};
pub use realloc::ReallocReport;
pub use turtle::{BASE_COLOR_COUNT, Turtle, base_color};
pub use value::{AgentKind, AgentRef, DEAD_ID, Value, ValueConstraint};
pub use view::WorldView;
pub use watch::{WatchCallback, WatcherKey, Watchers};
pub use world::{RandomState, World};

pub use logoworld_topology::{
    Axis, PatchCoord, Point, Topology, TopologyError, TopologyKind, WorldBounds,
};
