use crate::drawing::DrawingLine;
use crate::link::Link;
use crate::observer::Observer;
use crate::patch::Patch;
use crate::turtle::Turtle;
use crate::value::Value;
use crate::world::World;
use logoworld_topology::WorldBounds;

/// Read-only window onto a world for renderers.
///
/// Borrowing the world immutably means no job can mutate it while a frame is
/// assembled. Call [`World::mark_clean`] once the frame has been drawn.
#[derive(Debug, Clone, Copy)]
pub struct WorldView<'a> {
    world: &'a World,
}

impl<'a> WorldView<'a> {
    #[must_use]
    pub fn bounds(&self) -> &'a WorldBounds {
        self.world.bounds()
    }

    #[must_use]
    pub fn ticks(&self) -> Option<f64> {
        self.world.ticks()
    }

    /// True when anything visible changed since the last `mark_clean`.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.world.is_dirty()
    }

    /// Patch colours in patch id order, so row-major from the top-left corner.
    pub fn patch_colors(&self) -> impl ExactSizeIterator<Item = &'a Value> + 'a {
        self.world.patches().iter().map(Patch::pcolor)
    }

    /// Patch colours as numbers; RGB colours are reported as `None`.
    #[must_use]
    pub fn numeric_patch_colors(&self) -> Vec<Option<f64>> {
        self.patch_colors().map(Value::as_number).collect()
    }

    #[must_use]
    pub fn patches(&self) -> &'a [Patch] {
        self.world.patches()
    }

    pub fn turtles(&self) -> impl Iterator<Item = &'a Turtle> + 'a {
        self.world.turtles()
    }

    pub fn visible_turtles(&self) -> impl Iterator<Item = &'a Turtle> + 'a {
        self.world.turtles().filter(|turtle| !turtle.is_hidden())
    }

    pub fn links(&self) -> impl Iterator<Item = &'a Link> + 'a {
        self.world.links()
    }

    #[must_use]
    pub fn drawing(&self) -> &'a [DrawingLine] {
        self.world.drawing().lines()
    }

    #[must_use]
    pub fn observer(&self) -> &'a Observer {
        self.world.observer()
    }
}

impl World {
    #[must_use]
    pub fn view(&self) -> WorldView<'_> {
        WorldView { world: self }
    }
}
