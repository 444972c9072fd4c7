//! Flat key/value configuration
//!
//! The render core is configured through a flat property bag with dotted
//! namespaces (`lightstrategy.entry.radius`, `photongi.caustic.enabled`, …).
//! Values keep their insertion order so a bag can be written back out in a
//! stable form.

use std::fmt;

use rustc_hash::FxHashMap;

/// A single property value
#[derive(Debug, Clone, PartialEq)]
pub enum PropValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Floats(Vec<f64>),
}

impl fmt::Display for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropValue::Bool(v) => write!(f, "{}", v),
            PropValue::Int(v) => write!(f, "{}", v),
            PropValue::Float(v) => write!(f, "{}", v),
            PropValue::Str(v) => write!(f, "{}", v),
            PropValue::Floats(v) => {
                let parts: Vec<String> = v.iter().map(|x| x.to_string()).collect();
                write!(f, "{}", parts.join(" "))
            }
        }
    }
}

impl From<bool> for PropValue {
    fn from(v: bool) -> Self {
        PropValue::Bool(v)
    }
}
impl From<i64> for PropValue {
    fn from(v: i64) -> Self {
        PropValue::Int(v)
    }
}
impl From<u32> for PropValue {
    fn from(v: u32) -> Self {
        PropValue::Int(v as i64)
    }
}
impl From<f32> for PropValue {
    fn from(v: f32) -> Self {
        PropValue::Float(v as f64)
    }
}
impl From<f64> for PropValue {
    fn from(v: f64) -> Self {
        PropValue::Float(v)
    }
}
impl From<&str> for PropValue {
    fn from(v: &str) -> Self {
        PropValue::Str(v.to_string())
    }
}
impl From<String> for PropValue {
    fn from(v: String) -> Self {
        PropValue::Str(v)
    }
}

/// Ordered flat property bag
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Props {
    values: FxHashMap<String, PropValue>,
    order: Vec<String>,
}

impl Props {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<PropValue>) -> &mut Self {
        let key = key.into();
        if !self.values.contains_key(&key) {
            self.order.push(key.clone());
        }
        self.values.insert(key, value.into());
        self
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<PropValue>) -> Self {
        self.set(key, value);
        self
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&PropValue> {
        self.values.get(key)
    }

    /// Keys in insertion order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Keys that start with `prefix`
    pub fn keys_with_prefix<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a str> {
        self.keys().filter(move |k| k.starts_with(prefix))
    }

    /// Merge `other` into this bag, overriding on conflict
    pub fn merge(&mut self, other: &Props) {
        for key in other.keys() {
            self.set(key, other.values[key].clone());
        }
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.values.get(key) {
            Some(PropValue::Bool(v)) => *v,
            Some(PropValue::Int(v)) => *v != 0,
            Some(PropValue::Str(s)) => s == "1" || s.eq_ignore_ascii_case("true"),
            _ => default,
        }
    }

    pub fn get_i64(&self, key: &str, default: i64) -> i64 {
        match self.values.get(key) {
            Some(PropValue::Int(v)) => *v,
            Some(PropValue::Float(v)) => *v as i64,
            Some(PropValue::Str(s)) => s.parse().unwrap_or(default),
            _ => default,
        }
    }

    pub fn get_u32(&self, key: &str, default: u32) -> u32 {
        self.get_i64(key, default as i64).max(0) as u32
    }

    pub fn get_f64(&self, key: &str, default: f64) -> f64 {
        match self.values.get(key) {
            Some(PropValue::Float(v)) => *v,
            Some(PropValue::Int(v)) => *v as f64,
            Some(PropValue::Str(s)) => s.parse().unwrap_or(default),
            _ => default,
        }
    }

    pub fn get_f32(&self, key: &str, default: f32) -> f32 {
        self.get_f64(key, default as f64) as f32
    }

    pub fn get_str(&self, key: &str, default: &str) -> String {
        match self.values.get(key) {
            Some(PropValue::Str(s)) => s.clone(),
            Some(v) => v.to_string(),
            None => default.to_string(),
        }
    }
}
