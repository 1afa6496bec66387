//! Slot-indexed variable access for every agent kind.
//!
//! Built-in slots route to the typed mutators so that, for example, setting
//! `XCOR` moves the turtle with every side effect. Every successful set is
//! reported to the watchers of the variable's name.

use crate::drawing::PenMode;
use crate::error::AgentError;
use crate::link::TieMode;
use crate::program::Layout;
use crate::value::{AgentKind, AgentRef, Value, ValueConstraint};
use crate::world::World;

mod turtle_slot {
    pub const WHO: usize = 0;
    pub const COLOR: usize = 1;
    pub const HEADING: usize = 2;
    pub const XCOR: usize = 3;
    pub const YCOR: usize = 4;
    pub const SHAPE: usize = 5;
    pub const LABEL: usize = 6;
    pub const LABEL_COLOR: usize = 7;
    pub const BREED: usize = 8;
    pub const HIDDEN: usize = 9;
    pub const SIZE: usize = 10;
    pub const PEN_SIZE: usize = 11;
    pub const PEN_MODE: usize = 12;
    pub const ZCOR: usize = 13;
    pub const PITCH: usize = 14;
    pub const ROLL: usize = 15;
}

mod patch_slot {
    pub const PXCOR: usize = 0;
    pub const PYCOR: usize = 1;
    pub const PCOLOR: usize = 2;
    pub const PLABEL: usize = 3;
    pub const PLABEL_COLOR: usize = 4;
    pub const PZCOR: usize = 5;
}

mod link_slot {
    pub const END1: usize = 0;
    pub const END2: usize = 1;
    pub const COLOR: usize = 2;
    pub const LABEL: usize = 3;
    pub const LABEL_COLOR: usize = 4;
    pub const HIDDEN: usize = 5;
    pub const BREED: usize = 6;
    pub const THICKNESS: usize = 7;
    pub const SHAPE: usize = 8;
    pub const TIE_MODE: usize = 9;
}

fn wrong_type(variable: &str, expected: &'static str, found: &Value) -> AgentError {
    AgentError::WrongType {
        variable: variable.to_owned(),
        expected,
        found: found.to_string(),
    }
}

fn number(variable: &str, value: &Value) -> Result<f64, AgentError> {
    value
        .as_number()
        .ok_or_else(|| wrong_type(variable, "number", value))
}

fn boolean(variable: &str, value: &Value) -> Result<bool, AgentError> {
    value
        .as_bool()
        .ok_or_else(|| wrong_type(variable, "boolean", value))
}

fn text<'a>(variable: &str, value: &'a Value) -> Result<&'a str, AgentError> {
    value
        .as_str()
        .ok_or_else(|| wrong_type(variable, "string", value))
}

fn color(variable: &str, value: Value) -> Result<Value, AgentError> {
    if value.is_color() {
        Ok(value)
    } else {
        Err(wrong_type(variable, "color", &value))
    }
}

fn slot_name(layout: &Layout, kind: AgentKind, index: usize) -> Result<String, AgentError> {
    layout
        .name(index)
        .map(str::to_owned)
        .ok_or(AgentError::VariableOutOfRange { kind, index })
}

fn slot_index(layout: &Layout, kind: AgentKind, name: &str) -> Result<usize, AgentError> {
    layout.index_of(name).ok_or_else(|| AgentError::NoSuchVariable {
        kind,
        name: name.to_uppercase(),
    })
}

impl World {
    pub fn global(&self, index: usize) -> Result<&Value, AgentError> {
        self.observer
            .globals
            .get(index)
            .ok_or(AgentError::VariableOutOfRange {
                kind: AgentKind::Observer,
                index,
            })
    }

    /// Sets a global, enforcing its constraint.
    pub fn set_global(&mut self, index: usize, value: Value) -> Result<(), AgentError> {
        let name = slot_name(self.schema.globals(), AgentKind::Observer, index)?;
        if let Some(constraint) = self.observer.constraint(index) {
            constraint
                .check(&value)
                .map_err(|message| AgentError::Constraint {
                    variable: name.clone(),
                    message,
                })?;
        }
        self.observer.globals[index] = value.clone();
        self.notify_watchers(AgentRef::Observer, &name, &value);
        Ok(())
    }

    /// Attaches (or with `None` removes) the interface constraint of a global.
    pub fn set_global_constraint(
        &mut self,
        index: usize,
        constraint: Option<ValueConstraint>,
    ) -> Result<(), AgentError> {
        let slot = self
            .observer
            .constraints
            .get_mut(index)
            .ok_or(AgentError::VariableOutOfRange {
                kind: AgentKind::Observer,
                index,
            })?;
        *slot = constraint;
        Ok(())
    }

    fn turtle_layout(&self, id: i64) -> Result<&Layout, AgentError> {
        let breed = &self.turtle(id)?.breed;
        self.schema
            .turtles(breed)
            .ok_or_else(|| AgentError::NoSuchBreed(breed.clone()))
    }

    pub fn turtle_variable(&self, id: i64, index: usize) -> Result<Value, AgentError> {
        use turtle_slot::*;
        let turtle = self.turtle(id)?;
        let builtins = self.turtle_layout(id)?.builtin_count();
        let value = match index {
            WHO => Value::Number(turtle.id as f64),
            COLOR => turtle.color.clone(),
            HEADING => Value::Number(turtle.heading),
            XCOR => Value::Number(turtle.position.x),
            YCOR => Value::Number(turtle.position.y),
            SHAPE => Value::Str(turtle.shape.clone()),
            LABEL => turtle.label.clone(),
            LABEL_COLOR => turtle.label_color.clone(),
            BREED => Value::Breed(turtle.breed.clone()),
            HIDDEN => Value::Boolean(turtle.hidden),
            SIZE => Value::Number(turtle.size),
            PEN_SIZE => Value::Number(turtle.pen_size),
            PEN_MODE => Value::Str(turtle.pen_mode.as_str().to_owned()),
            ZCOR if index < builtins => Value::Number(turtle.position.z),
            PITCH if index < builtins => Value::Number(turtle.pitch),
            ROLL if index < builtins => Value::Number(turtle.roll),
            _ => turtle
                .vars
                .get(index - builtins)
                .cloned()
                .ok_or(AgentError::VariableOutOfRange {
                    kind: AgentKind::Turtle,
                    index,
                })?,
        };
        Ok(value)
    }

    pub fn set_turtle_variable(
        &mut self,
        id: i64,
        index: usize,
        value: Value,
    ) -> Result<(), AgentError> {
        use turtle_slot::*;
        let layout = self.turtle_layout(id)?;
        let builtins = layout.builtin_count();
        let name = slot_name(layout, AgentKind::Turtle, index)?;
        match index {
            WHO => return Err(AgentError::ReadOnlyVariable(name)),
            COLOR => self.turtle_mut(id)?.color = color(&name, value)?,
            HEADING => self.set_heading(id, number(&name, &value)?)?,
            XCOR => self.set_xcor(id, number(&name, &value)?)?,
            YCOR => self.set_ycor(id, number(&name, &value)?)?,
            SHAPE => self.turtle_mut(id)?.shape = text(&name, &value)?.to_lowercase(),
            LABEL => self.turtle_mut(id)?.label = value,
            LABEL_COLOR => self.turtle_mut(id)?.label_color = color(&name, value)?,
            BREED => match &value {
                Value::Breed(breed) => self.set_breed(id, breed)?,
                other => return Err(wrong_type(&name, "turtle breed", other)),
            },
            HIDDEN => self.turtle_mut(id)?.hidden = boolean(&name, &value)?,
            SIZE => self.turtle_mut(id)?.size = number(&name, &value)?,
            PEN_SIZE => self.turtle_mut(id)?.pen_size = number(&name, &value)?,
            PEN_MODE => {
                let mode = text(&name, &value)?
                    .parse::<PenMode>()
                    .map_err(AgentError::InvalidOperation)?;
                self.turtle_mut(id)?.pen_mode = mode;
            }
            ZCOR if index < builtins => self.set_zcor(id, number(&name, &value)?)?,
            PITCH if index < builtins => self.set_pitch(id, number(&name, &value)?)?,
            ROLL if index < builtins => self.set_roll(id, number(&name, &value)?)?,
            _ => self.turtle_mut(id)?.vars[index - builtins] = value,
        }
        self.dirty = true;
        if self.watchers.is_watched(&name) {
            let stored = self.turtle_variable(id, index)?;
            self.notify_watchers(AgentRef::Turtle(id), &name, &stored);
        }
        Ok(())
    }

    pub fn patch_variable(&self, patch: usize, index: usize) -> Result<Value, AgentError> {
        use patch_slot::*;
        let builtins = self.schema.patches().builtin_count();
        let target = self.patch(patch)?;
        let value = match index {
            PXCOR => Value::Number(f64::from(target.coord.x)),
            PYCOR => Value::Number(f64::from(target.coord.y)),
            PCOLOR => target.pcolor.clone(),
            PLABEL => target.plabel.clone(),
            PLABEL_COLOR => target.plabel_color.clone(),
            PZCOR if index < builtins => Value::Number(f64::from(target.coord.z)),
            _ => target
                .vars
                .get(index - builtins)
                .cloned()
                .ok_or(AgentError::VariableOutOfRange {
                    kind: AgentKind::Patch,
                    index,
                })?,
        };
        Ok(value)
    }

    pub fn set_patch_variable(
        &mut self,
        patch: usize,
        index: usize,
        value: Value,
    ) -> Result<(), AgentError> {
        use patch_slot::*;
        let layout = self.schema.patches();
        let builtins = layout.builtin_count();
        let name = slot_name(layout, AgentKind::Patch, index)?;
        self.patch(patch)?;
        let target = &mut self.patches[patch];
        match index {
            PXCOR | PYCOR => return Err(AgentError::ReadOnlyVariable(name)),
            PZCOR if index < builtins => return Err(AgentError::ReadOnlyVariable(name)),
            PCOLOR => target.pcolor = color(&name, value.clone())?,
            PLABEL => target.plabel = value.clone(),
            PLABEL_COLOR => target.plabel_color = color(&name, value.clone())?,
            _ => target.vars[index - builtins] = value.clone(),
        }
        self.dirty = true;
        self.notify_watchers(AgentRef::Patch(patch), &name, &value);
        Ok(())
    }

    fn link_layout(&self, id: i64) -> Result<&Layout, AgentError> {
        let breed = &self.link(id)?.breed;
        self.schema
            .links(breed)
            .ok_or_else(|| AgentError::NoSuchBreed(breed.clone()))
    }

    pub fn link_variable(&self, id: i64, index: usize) -> Result<Value, AgentError> {
        use link_slot::*;
        let link = self.link(id)?;
        let builtins = self.link_layout(id)?.builtin_count();
        let value = match index {
            END1 => Value::Agent(AgentRef::Turtle(link.end1)),
            END2 => Value::Agent(AgentRef::Turtle(link.end2)),
            COLOR => link.color.clone(),
            LABEL => link.label.clone(),
            LABEL_COLOR => link.label_color.clone(),
            HIDDEN => Value::Boolean(link.hidden),
            BREED => Value::Breed(link.breed.clone()),
            THICKNESS => Value::Number(link.thickness),
            SHAPE => Value::Str(link.shape.clone()),
            TIE_MODE => Value::Str(link.tie_mode.as_str().to_owned()),
            _ => link
                .vars
                .get(index - builtins)
                .cloned()
                .ok_or(AgentError::VariableOutOfRange {
                    kind: AgentKind::Link,
                    index,
                })?,
        };
        Ok(value)
    }

    pub fn set_link_variable(
        &mut self,
        id: i64,
        index: usize,
        value: Value,
    ) -> Result<(), AgentError> {
        use link_slot::*;
        let layout = self.link_layout(id)?;
        let builtins = layout.builtin_count();
        let name = slot_name(layout, AgentKind::Link, index)?;
        if index == TIE_MODE {
            let mode = text(&name, &value)?
                .parse::<TieMode>()
                .map_err(AgentError::InvalidOperation)?;
            self.set_tie_mode(id, mode)?;
        } else {
            let link = self
                .links
                .get_mut(&id)
                .ok_or(AgentError::dead(AgentKind::Link))?;
            match index {
                END1 | END2 | BREED => return Err(AgentError::ReadOnlyVariable(name)),
                COLOR => link.color = color(&name, value.clone())?,
                LABEL => link.label = value.clone(),
                LABEL_COLOR => link.label_color = color(&name, value.clone())?,
                HIDDEN => link.hidden = boolean(&name, &value)?,
                THICKNESS => link.thickness = number(&name, &value)?,
                SHAPE => link.shape = text(&name, &value)?.to_lowercase(),
                _ => link.vars[index - builtins] = value.clone(),
            }
        }
        self.dirty = true;
        self.notify_watchers(AgentRef::Link(id), &name, &value);
        Ok(())
    }

    /// Slot index of `name` for `agent`, honouring the agent's breed.
    pub fn variable_index(&self, agent: AgentRef, name: &str) -> Result<usize, AgentError> {
        match agent {
            AgentRef::Observer => slot_index(self.schema.globals(), AgentKind::Observer, name),
            AgentRef::Turtle(id) => slot_index(self.turtle_layout(id)?, AgentKind::Turtle, name),
            AgentRef::Patch(_) => slot_index(self.schema.patches(), AgentKind::Patch, name),
            AgentRef::Link(id) => slot_index(self.link_layout(id)?, AgentKind::Link, name),
        }
    }

    /// Reads a variable of any agent by name.
    pub fn variable(&self, agent: AgentRef, name: &str) -> Result<Value, AgentError> {
        let index = self.variable_index(agent, name)?;
        match agent {
            AgentRef::Observer => self.global(index).cloned(),
            AgentRef::Turtle(id) => self.turtle_variable(id, index),
            AgentRef::Patch(patch) => self.patch_variable(patch, index),
            AgentRef::Link(id) => self.link_variable(id, index),
        }
    }

    /// Sets a variable of any agent by name.
    pub fn set_variable(
        &mut self,
        agent: AgentRef,
        name: &str,
        value: Value,
    ) -> Result<(), AgentError> {
        let index = self.variable_index(agent, name)?;
        match agent {
            AgentRef::Observer => self.set_global(index, value),
            AgentRef::Turtle(id) => self.set_turtle_variable(id, index, value),
            AgentRef::Patch(patch) => self.set_patch_variable(patch, index, value),
            AgentRef::Link(id) => self.set_link_variable(id, index, value),
        }
    }
}
