use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

/// A point-in-time reading of an `Accumulator`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Value {
    Integer(u64),
    Float(f64),
}

impl Value {
    pub fn is_float(&self) -> bool {
        matches!(self, Value::Float(_))
    }

    pub fn as_u64(&self) -> u64 {
        match self {
            Value::Integer(v) => *v,
            // `as` truncates toward zero, saturates at the bounds and maps NaN to 0
            Value::Float(v) => *v as u64,
        }
    }

    pub fn as_f64(&self) -> f64 {
        match self {
            Value::Integer(v) => *v as f64,
            Value::Float(v) => *v,
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Integer(0)
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Integer(v) => write!(f, "{v}"),
            Value::Float(v) if v.is_nan() => f.write_str("NaN"),
            Value::Float(v) if v.is_infinite() => {
                f.write_str(if v.is_sign_positive() { "+Inf" } else { "-Inf" })
            }
            Value::Float(v) => write!(f, "{v}"),
        }
    }
}

/// The value cell of a single label combination.
///
/// Integer adds always go to an atomic cell. The first float add promotes
/// the accumulator to float mode for good, from then on readings report the
/// float sum plus the integer cell, so the result does not depend on how
/// integer and float adds interleave.
#[derive(Debug, Default)]
pub struct Accumulator {
    integer: AtomicU64,
    // `None` while in integer mode
    float: Mutex<Option<f64>>,
}

impl Accumulator {
    pub fn inc(&self) {
        self.add_uint(1)
    }

    pub fn add_uint(&self, value: u64) {
        self.integer.fetch_add(value, Ordering::Relaxed);
    }

    pub fn add_float(&self, value: f64) {
        let mut float = self.float.lock();
        *float = Some(float.unwrap_or_default() + value);
    }

    pub fn value(&self) -> Value {
        let float = self.float.lock();
        let integer = self.integer.load(Ordering::Relaxed);

        match *float {
            Some(sum) => Value::Float(sum + integer as f64),
            None => Value::Integer(integer),
        }
    }
}
