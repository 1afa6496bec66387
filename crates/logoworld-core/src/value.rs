use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel identity of an agent that has died.
pub const DEAD_ID: i64 = -1;

/// The four agent kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AgentKind {
    Observer,
    Turtle,
    Patch,
    Link,
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AgentKind::Observer => "observer",
            AgentKind::Turtle => "turtle",
            AgentKind::Patch => "patch",
            AgentKind::Link => "link",
        };
        f.write_str(name)
    }
}

/// Handle to one agent. Turtles and links are keyed by their id, patches by their patch id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AgentRef {
    Observer,
    Turtle(i64),
    Patch(usize),
    Link(i64),
}

impl AgentRef {
    #[must_use]
    pub fn kind(&self) -> AgentKind {
        match self {
            AgentRef::Observer => AgentKind::Observer,
            AgentRef::Turtle(_) => AgentKind::Turtle,
            AgentRef::Patch(_) => AgentKind::Patch,
            AgentRef::Link(_) => AgentKind::Link,
        }
    }
}

impl fmt::Display for AgentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentRef::Observer => f.write_str("observer"),
            AgentRef::Turtle(id) => write!(f, "(turtle {id})"),
            AgentRef::Patch(id) => write!(f, "(patch #{id})"),
            AgentRef::Link(id) => write!(f, "(link #{id})"),
        }
    }
}

/// Dynamically typed variable value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Number(f64),
    Boolean(bool),
    Str(String),
    List(Vec<Value>),
    Agent(AgentRef),
    /// A breed agentset, by breed name.
    Breed(String),
    Nobody,
}

impl Default for Value {
    fn default() -> Self {
        Value::Number(0.0)
    }
}

impl Value {
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_agent(&self) -> Option<AgentRef> {
        match self {
            Value::Agent(agent) => Some(*agent),
            _ => None,
        }
    }

    /// Colors are either a number or an RGB(A) list of numbers.
    #[must_use]
    pub fn is_color(&self) -> bool {
        match self {
            Value::Number(_) => true,
            Value::List(items) => {
                (3..=4).contains(&items.len()) && items.iter().all(|v| v.as_number().is_some())
            }
            _ => false,
        }
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Boolean(_) => "boolean",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Agent(_) => "agent",
            Value::Breed(_) => "agentset",
            Value::Nobody => "nobody",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{n:.0}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Str(s) => write!(f, "\"{s}\""),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Agent(agent) => write!(f, "{agent}"),
            Value::Breed(name) => f.write_str(&name.to_lowercase()),
            Value::Nobody => f.write_str("nobody"),
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<AgentRef> for Value {
    fn from(value: AgentRef) -> Self {
        Value::Agent(value)
    }
}

/// Restriction attached to a global slot by the interface that owns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ValueConstraint {
    /// Slider: any number, with a display range.
    NumberRange { min: f64, max: f64, default: f64 },
    /// Chooser: one of a fixed set of values.
    Choice { options: Vec<Value>, default: Value },
    /// Switch.
    Boolean { default: bool },
    /// Input box holding text.
    Text { default: String },
}

impl ValueConstraint {
    #[must_use]
    pub fn default_value(&self) -> Value {
        match self {
            ValueConstraint::NumberRange { default, .. } => Value::Number(*default),
            ValueConstraint::Choice { default, .. } => default.clone(),
            ValueConstraint::Boolean { default } => Value::Boolean(*default),
            ValueConstraint::Text { default } => Value::Str(default.clone()),
        }
    }

    /// Checks `value`, returning a human readable reason on rejection.
    pub fn check(&self, value: &Value) -> Result<(), String> {
        match (self, value) {
            (ValueConstraint::NumberRange { .. }, Value::Number(_)) => Ok(()),
            (ValueConstraint::Boolean { .. }, Value::Boolean(_)) => Ok(()),
            (ValueConstraint::Text { .. }, Value::Str(_)) => Ok(()),
            (ValueConstraint::Choice { options, .. }, candidate) => {
                if options.contains(candidate) {
                    Ok(())
                } else {
                    Err(format!("{candidate} is not one of the allowed choices"))
                }
            }
            (ValueConstraint::NumberRange { .. }, other) => {
                Err(format!("expected a number but got {other}"))
            }
            (ValueConstraint::Boolean { .. }, other) => {
                Err(format!("expected true or false but got {other}"))
            }
            (ValueConstraint::Text { .. }, other) => {
                Err(format!("expected a string but got {other}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_logo_conventions() {
        assert_eq!(Value::Number(3.0).to_string(), "3");
        assert_eq!(Value::Number(2.5).to_string(), "2.5");
        assert_eq!(
            Value::List(vec![Value::Number(1.0), Value::from("a")]).to_string(),
            "[1 \"a\"]"
        );
        assert_eq!(Value::Agent(AgentRef::Turtle(4)).to_string(), "(turtle 4)");
        assert_eq!(Value::Breed("WOLVES".into()).to_string(), "wolves");
    }

    #[test]
    fn constraints_check_types_and_choices() {
        let slider = ValueConstraint::NumberRange {
            min: 0.0,
            max: 10.0,
            default: 5.0,
        };
        assert!(slider.check(&Value::Number(50.0)).is_ok());
        assert!(slider.check(&Value::from("x")).is_err());
        assert_eq!(slider.default_value(), Value::Number(5.0));

        let chooser = ValueConstraint::Choice {
            options: vec![Value::from("a"), Value::from("b")],
            default: Value::from("a"),
        };
        assert!(chooser.check(&Value::from("b")).is_ok());
        assert!(chooser.check(&Value::from("c")).is_err());
    }

    #[test]
    fn colors_are_numbers_or_rgb_lists() {
        assert!(Value::Number(15.0).is_color());
        let rgb = Value::List(vec![Value::Number(1.0), Value::Number(2.0), Value::Number(3.0)]);
        assert!(rgb.is_color());
        assert!(!Value::List(vec![Value::Number(1.0)]).is_color());
        assert!(!Value::from("red").is_color());
    }
}
