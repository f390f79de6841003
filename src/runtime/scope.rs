use crate::runtime::error::ErrorKind;
use crate::runtime::value::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// One storage location. Aliased slots (function arguments) share the cell;
/// the flags travel with the binding, not the storage.
#[derive(Clone)]
pub struct Slot {
    pub cell: Arc<Mutex<Value>>,
    pub mono: bool,
    pub borrowed: bool,
}

impl Slot {
    pub fn owned(value: Value, mono: bool) -> Self {
        Self {
            cell: Arc::new(Mutex::new(value)),
            mono,
            borrowed: false,
        }
    }

    /// A borrowed view of the same storage for binding into a callee frame.
    pub fn alias(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
            mono: self.mono,
            borrowed: true,
        }
    }

    pub fn value(&self) -> Value {
        self.cell.lock().unwrap().clone()
    }

    pub fn set(&self, value: Value) {
        *self.cell.lock().unwrap() = value;
    }

    pub fn shares_storage_with(&self, other: &Slot) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }
}

/// The per-call scope frame. Railway scoping is function-level: branches and
/// loop bodies bind into the frame of the enclosing call.
pub struct Frame {
    slots: HashMap<String, Slot>,
}

/// A deep copy of a frame's bindings, used to roll back failed try attempts.
/// Restoring writes the saved values back through the original cells so that
/// aliased caller storage is rolled back too.
pub struct FrameSnapshot {
    saved: Vec<(String, Slot, Value)>,
}

impl Frame {
    pub fn new() -> Self {
        Self {
            slots: HashMap::new(),
        }
    }

    pub fn bind(&mut self, name: &str, slot: Slot) -> Result<(), ErrorKind> {
        if self.slots.contains_key(name) {
            return Err(ErrorKind::Scope(format!(
                "Variable '{}' already exists",
                name
            )));
        }
        self.slots.insert(name.to_string(), slot);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Result<Slot, ErrorKind> {
        self.slots.remove(name).ok_or_else(|| {
            ErrorKind::Scope(format!("Local variable '{}' does not exist", name))
        })
    }

    pub fn get(&self, name: &str) -> Option<&Slot> {
        self.slots.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }

    pub fn has_mono_binding(&self) -> Option<&str> {
        self.slots
            .iter()
            .find(|(_, slot)| slot.mono)
            .map(|(name, _)| name.as_str())
    }

    /// Drops mono bindings, then reports any remaining name that is not in
    /// `keep` (the parameter list of the enclosing call).
    pub fn close(&mut self, keep: &[&str]) -> Result<(), ErrorKind> {
        self.slots.retain(|_, slot| !slot.mono);
        for name in self.slots.keys() {
            if !keep.contains(&name.as_str()) {
                return Err(ErrorKind::Scope(format!(
                    "Variable '{}' is still in scope at the end of the call",
                    name
                )));
            }
        }
        for expected in keep {
            if !self.slots.contains_key(*expected) {
                return Err(ErrorKind::Scope(format!(
                    "Parameter '{}' is not in scope at the end of the call",
                    expected
                )));
            }
        }
        Ok(())
    }

    pub fn snapshot(&self) -> FrameSnapshot {
        FrameSnapshot {
            saved: self
                .slots
                .iter()
                .map(|(name, slot)| (name.clone(), slot.clone(), slot.value()))
                .collect(),
        }
    }

    pub fn restore(&mut self, snapshot: &FrameSnapshot) {
        self.slots.clear();
        for (name, slot, value) in &snapshot.saved {
            slot.set(value.clone());
            self.slots.insert(name.clone(), slot.clone());
        }
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_binding_is_rejected() {
        let mut frame = Frame::new();
        frame.bind("x", Slot::owned(Value::from_i64(1), false)).unwrap();
        let err = frame
            .bind("x", Slot::owned(Value::from_i64(2), false))
            .unwrap_err();
        assert!(matches!(err, ErrorKind::Scope(_)));
    }

    #[test]
    fn aliases_share_storage() {
        let mut caller = Frame::new();
        caller.bind("x", Slot::owned(Value::from_i64(1), false)).unwrap();
        let alias = caller.get("x").unwrap().alias();
        alias.set(Value::from_i64(9));
        assert_eq!(caller.get("x").unwrap().value(), Value::from_i64(9));
        assert!(alias.borrowed);
    }

    #[test]
    fn close_drops_monos_and_flags_leaks() {
        let mut frame = Frame::new();
        frame.bind(".m", Slot::owned(Value::from_i64(1), true)).unwrap();
        frame.bind("p", Slot::owned(Value::from_i64(2), false)).unwrap();
        frame.close(&["p"]).unwrap();

        let mut leaky = Frame::new();
        leaky.bind("x", Slot::owned(Value::from_i64(3), false)).unwrap();
        assert!(leaky.close(&[]).is_err());
    }

    #[test]
    fn snapshot_restores_aliased_storage() {
        let mut frame = Frame::new();
        let shared = Slot::owned(Value::from_i64(1), false);
        frame.bind("x", shared.clone()).unwrap();
        let snapshot = frame.snapshot();

        shared.set(Value::from_i64(42));
        frame.bind("temp", Slot::owned(Value::zero(), false)).unwrap();
        frame.restore(&snapshot);

        assert_eq!(shared.value(), Value::from_i64(1));
        assert!(!frame.contains("temp"));
    }
}
