use crate::value::Value;
use logoworld_topology::Point;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Turtle pen state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PenMode {
    #[default]
    Up,
    Down,
    Erase,
}

impl PenMode {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            PenMode::Up => "up",
            PenMode::Down => "down",
            PenMode::Erase => "erase",
        }
    }
}

impl fmt::Display for PenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PenMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(PenMode::Up),
            "down" => Ok(PenMode::Down),
            "erase" => Ok(PenMode::Erase),
            other => Err(format!("{other} is not a valid pen mode")),
        }
    }
}

/// One pen segment. `to` is the unwrapped destination, so a segment may cross
/// the world edge and renderers clip or wrap it themselves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawingLine {
    pub from: Point,
    pub to: Point,
    pub color: Value,
    pub size: f64,
    pub mode: PenMode,
}

/// Pen trails left by turtles.
#[derive(Debug, Clone, Default)]
pub struct Drawing {
    lines: Vec<DrawingLine>,
}

impl Drawing {
    #[must_use]
    pub fn lines(&self) -> &[DrawingLine] {
        &self.lines
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub(crate) fn push(&mut self, line: DrawingLine) {
        self.lines.push(line);
    }

    pub(crate) fn clear(&mut self) {
        self.lines.clear();
    }
}
