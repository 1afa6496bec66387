use crate::value::{AgentRef, Value};
use slotmap::{SlotMap, new_key_type};
use std::collections::HashMap;
use std::fmt;

new_key_type! {
    /// Handle returned when registering a watcher.
    pub struct WatcherKey;
}

/// Callback invoked with the agent, the upper-case variable name and the new value.
pub type WatchCallback = Box<dyn FnMut(AgentRef, &str, &Value) + Send>;

/// Variable-change subscriptions keyed by variable name.
///
/// Names rather than slot indices are used so subscriptions survive recompilation.
#[derive(Default)]
pub struct Watchers {
    callbacks: SlotMap<WatcherKey, (String, WatchCallback)>,
    by_name: HashMap<String, Vec<WatcherKey>>,
}

impl fmt::Debug for Watchers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watchers")
            .field("names", &self.by_name.keys().collect::<Vec<_>>())
            .field("count", &self.callbacks.len())
            .finish()
    }
}

impl Watchers {
    pub fn add(&mut self, name: &str, callback: WatchCallback) -> WatcherKey {
        let name = name.to_uppercase();
        let key = self.callbacks.insert((name.clone(), callback));
        self.by_name.entry(name).or_default().push(key);
        key
    }

    pub fn remove(&mut self, key: WatcherKey) -> bool {
        let Some((name, _)) = self.callbacks.remove(key) else {
            return false;
        };
        if let Some(keys) = self.by_name.get_mut(&name) {
            keys.retain(|candidate| *candidate != key);
            if keys.is_empty() {
                self.by_name.remove(&name);
            }
        }
        true
    }

    /// Drops every watcher of `name`, returning how many were removed.
    pub fn remove_all(&mut self, name: &str) -> usize {
        let keys = self.by_name.remove(&name.to_uppercase()).unwrap_or_default();
        for key in &keys {
            self.callbacks.remove(*key);
        }
        keys.len()
    }

    #[must_use]
    pub fn is_watched(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    /// `name` must already be upper case.
    pub(crate) fn notify(&mut self, agent: AgentRef, name: &str, value: &Value) {
        let Some(keys) = self.by_name.get(name) else {
            return;
        };
        for key in keys {
            if let Some((_, callback)) = self.callbacks.get_mut(*key) {
                callback(agent, name, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn watchers_fire_by_name_and_can_be_removed() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut watchers = Watchers::default();
        let sink = Arc::clone(&seen);
        let key = watchers.add(
            "energy",
            Box::new(move |agent, name, value| {
                sink.lock()
                    .expect("lock")
                    .push((agent, name.to_owned(), value.clone()));
            }),
        );
        watchers.notify(AgentRef::Turtle(1), "ENERGY", &Value::Number(2.0));
        watchers.notify(AgentRef::Turtle(1), "AGE", &Value::Number(3.0));
        assert_eq!(seen.lock().expect("lock").len(), 1);

        assert!(watchers.remove(key));
        assert!(!watchers.remove(key));
        watchers.notify(AgentRef::Turtle(1), "ENERGY", &Value::Number(4.0));
        assert_eq!(seen.lock().expect("lock").len(), 1);
        assert!(watchers.is_empty());
    }

    #[test]
    fn remove_all_clears_a_name() {
        let mut watchers = Watchers::default();
        watchers.add("x", Box::new(|_, _, _| {}));
        watchers.add("X", Box::new(|_, _, _| {}));
        watchers.add("y", Box::new(|_, _, _| {}));
        assert_eq!(watchers.remove_all("x"), 2);
        assert!(!watchers.is_watched("X"));
        assert!(watchers.is_watched("Y"));
    }
}
