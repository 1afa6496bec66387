//! Linear text export and import of a LogoWorld.
//!
//! An export is a sequence of sections in a fixed order:
//!
//! ```text
//! RANDOM STATE
//! {"seed": <u64>, "word_pos": <u128>}
//! GLOBALS
//! BOUNDS  TICKS  <global names...>
//! <one row>
//! TURTLES
//! <every turtle variable name across breeds>
//! <one row per turtle>
//! PATCHES
//! <patch variable names>
//! <one row per patch, in patch id order>
//! LINKS
//! ID  DIRECTED?  <every link variable name across breeds>
//! <one row per link>
//! ```
//!
//! Header cells are bare names; row cells are JSON values separated by tabs. A
//! cell is left empty when the agent's breed has no such variable. The drawing
//! layer is not exported.

mod error;
mod export;
mod import;

pub use error::StorageError;
pub use export::{export_world, save_world};
pub use import::{ImportSummary, import_world, load_world};

pub(crate) const RANDOM_STATE: &str = "RANDOM STATE";
pub(crate) const GLOBALS: &str = "GLOBALS";
pub(crate) const TURTLES: &str = "TURTLES";
pub(crate) const PATCHES: &str = "PATCHES";
pub(crate) const LINKS: &str = "LINKS";

pub(crate) const BOUNDS_COLUMN: &str = "BOUNDS";
pub(crate) const TICKS_COLUMN: &str = "TICKS";
pub(crate) const ID_COLUMN: &str = "ID";
pub(crate) const DIRECTED_COLUMN: &str = "DIRECTED?";
