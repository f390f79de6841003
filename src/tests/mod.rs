mod properties;
mod scenarios;

use crate::runtime::error::RuntimeResult;
use crate::runtime::scope::Slot;
use crate::runtime::{Direction, Interpreter, ModuleRegistry, Value};
use std::sync::Arc;

fn load(source: &str) -> Arc<ModuleRegistry> {
    Arc::new(ModuleRegistry::from_source("test", source).expect("program should load"))
}

/// Calls `name` with the given parameter bindings aliased into its frame and
/// returns the values those bindings hold after the call.
fn call(
    registry: &Arc<ModuleRegistry>,
    name: &str,
    direction: Direction,
    bindings: &[(&str, Value)],
) -> RuntimeResult<Vec<Value>> {
    let mut interp = Interpreter::new(Arc::clone(registry), 1);
    let mut slots = Vec::new();
    for (param, value) in bindings {
        let slot = Slot::owned(value.clone(), false);
        interp
            .frame_mut()
            .bind(param, slot.alias())
            .expect("binding");
        slots.push(slot);
    }
    interp.call(name, direction)?;
    Ok(slots.iter().map(Slot::value).collect())
}

fn run_main(source: &str) -> RuntimeResult<()> {
    let registry = load(source);
    crate::runtime::run_program(registry, Value::Array(Vec::new()), 1)
}

fn num(n: i64) -> Value {
    Value::from_i64(n)
}

fn arr(items: &[i64]) -> Value {
    Value::Array(items.iter().copied().map(Value::from_i64).collect())
}
