// ABOUTME: Native function table seeded into the global environment

use crate::env::Environment;
use crate::value::{NativeFn, NativeKind, Value};
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Registers the native callables in the given (global) environment.
pub fn register(globals: &Rc<Environment>) {
    globals.define(
        "print",
        Value::Native(NativeFn {
            name: "print",
            arity: 1,
            kind: NativeKind::Print,
        }),
    );
    globals.define(
        "clock",
        Value::Native(NativeFn {
            name: "clock",
            arity: 0,
            kind: NativeKind::Clock,
        }),
    );
}

/// Seconds since the Unix epoch, with millisecond precision.
pub fn clock_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as f64 / 1000.0)
        .unwrap_or(0.0)
}
