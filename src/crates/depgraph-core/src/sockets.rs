//! Standard socket kinds and the socket type registry
//!
//! | type name | kind            | value shape          | lineage          |
//! |-----------|-----------------|----------------------|------------------|
//! | `float`   | [`FloatSocket`] | number               | float            |
//! | `int`     | [`IntSocket`]   | integer              | int              |
//! | `bool`    | [`BoolSocket`]  | boolean              | bool             |
//! | `depend`  | [`DependSocket`]| boolean              | depend           |
//! | `enum`    | [`EnumSocket`]  | integer or item name | enum, int        |
//! | `vec2`    | [`Vec2Socket`]  | `[x, y]`             | vec2             |
//! | `vec3`    | [`Vec3Socket`]  | `[x, y, z]`          | vec3             |
//! | `vec4`    | [`Vec4Socket`]  | `[x, y, z, w]`       | vec4             |
//! | `rgb`     | [`RgbSocket`]   | `[r, g, b]`          | rgb, vec3        |
//! | `rgba`    | [`RgbaSocket`]  | `[r, g, b, a]`       | rgba, vec4       |
//! | `mat4`    | [`Mat4Socket`]  | 16 numbers, row-major| mat4             |
//!
//! Loading a save needs to build sockets by type name, which is what
//! [`SocketRegistry`] provides. Hosts add their own kinds with
//! [`SocketRegistry::register`].

use crate::error::{GraphError, Result, SocketError};
use crate::socket::SocketKind;
use serde_json::{json, Value};
use std::any::Any;
use std::collections::HashMap;

macro_rules! kind_boilerplate {
    () => {
        fn box_clone(&self) -> Box<dyn SocketKind> {
            Box::new(self.clone())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    };
}

/// Floating point scalar
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FloatSocket(pub f64);

impl FloatSocket {
    pub fn new(value: f64) -> Self {
        Self(value)
    }
}

impl SocketKind for FloatSocket {
    fn type_name(&self) -> &'static str {
        "float"
    }

    fn lineage(&self) -> &'static [&'static str] {
        &["float"]
    }

    fn value(&self) -> Value {
        json!(self.0)
    }

    fn set_value(&mut self, value: &Value) -> std::result::Result<(), SocketError> {
        match value.as_f64() {
            Some(v) if v.is_nan() => Err(SocketError::NotANumber {
                socket_type: "float".to_string(),
            }),
            Some(v) => {
                self.0 = v;
                Ok(())
            }
            None => Err(SocketError::mismatch("float", value)),
        }
    }

    fn cmp_value(&self, other: &Value) -> f64 {
        other.as_f64().map(|o| self.0 - o).unwrap_or(f64::NAN)
    }

    fn diff_value(&self, other: &Value) -> f64 {
        self.cmp_value(other).abs()
    }

    kind_boilerplate!();
}

/// Integer scalar
///
/// Numbers with a fractional part are truncated on assignment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntSocket(pub i64);

impl IntSocket {
    pub fn new(value: i64) -> Self {
        Self(value)
    }
}

fn as_integer(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().filter(|v| v.is_finite()).map(|v| v.trunc() as i64))
}

impl SocketKind for IntSocket {
    fn type_name(&self) -> &'static str {
        "int"
    }

    fn lineage(&self) -> &'static [&'static str] {
        &["int"]
    }

    fn value(&self) -> Value {
        json!(self.0)
    }

    fn set_value(&mut self, value: &Value) -> std::result::Result<(), SocketError> {
        self.0 = as_integer(value).ok_or_else(|| SocketError::mismatch("int", value))?;
        Ok(())
    }

    fn cmp_value(&self, other: &Value) -> f64 {
        other.as_f64().map(|o| self.0 as f64 - o).unwrap_or(f64::NAN)
    }

    fn diff_value(&self, other: &Value) -> f64 {
        self.cmp_value(other).abs()
    }

    kind_boilerplate!();
}

/// Boolean
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BoolSocket(pub bool);

impl BoolSocket {
    pub fn new(value: bool) -> Self {
        Self(value)
    }
}

fn as_boolean(value: &Value) -> Option<bool> {
    value.as_bool().or_else(|| value.as_f64().map(|v| v != 0.0))
}

impl SocketKind for BoolSocket {
    fn type_name(&self) -> &'static str {
        "bool"
    }

    fn lineage(&self) -> &'static [&'static str] {
        &["bool"]
    }

    fn value(&self) -> Value {
        json!(self.0)
    }

    fn set_value(&mut self, value: &Value) -> std::result::Result<(), SocketError> {
        self.0 = as_boolean(value).ok_or_else(|| SocketError::mismatch("bool", value))?;
        Ok(())
    }

    fn diff_value(&self, other: &Value) -> f64 {
        match as_boolean(other) {
            Some(o) if o == self.0 => 0.0,
            Some(_) => 1.0,
            None => f64::NAN,
        }
    }

    kind_boilerplate!();
}

/// Pure ordering dependency
///
/// Carries no data beyond a toggle; connecting two depend sockets forces the
/// consumer to run after the producer. A changed toggle contributes a tiny
/// amount to the convergence metric so cycles of pure dependencies settle
/// quickly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DependSocket(pub bool);

impl SocketKind for DependSocket {
    fn type_name(&self) -> &'static str {
        "depend"
    }

    fn lineage(&self) -> &'static [&'static str] {
        &["depend"]
    }

    fn value(&self) -> Value {
        json!(self.0)
    }

    fn set_value(&mut self, value: &Value) -> std::result::Result<(), SocketError> {
        self.0 = as_boolean(value).ok_or_else(|| SocketError::mismatch("depend", value))?;
        Ok(())
    }

    fn diff_value(&self, other: &Value) -> f64 {
        match as_boolean(other) {
            Some(o) if o == self.0 => 0.0,
            Some(_) => 0.001,
            None => f64::NAN,
        }
    }

    kind_boilerplate!();
}

/// Integer with named items
///
/// Accepts either an integer or an item name. The item table belongs to the
/// node type, so a socket read from a save absorbs the current table from its
/// template.
///
/// ```rust
/// use depgraph_core::socket::SocketKind;
/// use depgraph_core::sockets::EnumSocket;
/// use serde_json::json;
///
/// let mut mode = EnumSocket::new(0).with_item("add", 0).with_item("multiply", 1);
/// mode.set_value(&json!("multiply")).unwrap();
/// assert_eq!(mode.value(), json!(1));
/// assert_eq!(mode.item_name(), Some("multiply"));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnumSocket {
    pub value: i64,
    items: Vec<(String, i64)>,
}

impl EnumSocket {
    pub fn new(value: i64) -> Self {
        Self {
            value,
            items: Vec::new(),
        }
    }

    /// Add a named item
    pub fn with_item(mut self, name: impl Into<String>, value: i64) -> Self {
        self.items.push((name.into(), value));
        self
    }

    pub fn items(&self) -> &[(String, i64)] {
        &self.items
    }

    /// Name of the current value, when it has one
    pub fn item_name(&self) -> Option<&str> {
        self.items
            .iter()
            .find(|(_, v)| *v == self.value)
            .map(|(name, _)| name.as_str())
    }

    fn resolve(&self, value: &Value) -> std::result::Result<i64, SocketError> {
        if let Some(name) = value.as_str() {
            return self
                .items
                .iter()
                .find(|(item, _)| item == name)
                .map(|(_, v)| *v)
                .ok_or_else(|| SocketError::UnknownEnumItem {
                    item: name.to_string(),
                });
        }
        as_integer(value).ok_or_else(|| SocketError::mismatch("enum", value))
    }
}

impl SocketKind for EnumSocket {
    fn type_name(&self) -> &'static str {
        "enum"
    }

    fn lineage(&self) -> &'static [&'static str] {
        &["enum", "int"]
    }

    fn value(&self) -> Value {
        json!(self.value)
    }

    fn set_value(&mut self, value: &Value) -> std::result::Result<(), SocketError> {
        self.value = self.resolve(value)?;
        Ok(())
    }

    fn cmp_value(&self, other: &Value) -> f64 {
        self.resolve(other)
            .map(|o| self.value as f64 - o as f64)
            .unwrap_or(f64::NAN)
    }

    fn diff_value(&self, other: &Value) -> f64 {
        self.cmp_value(other).abs()
    }

    fn absorb_template(&mut self, template: &dyn SocketKind) {
        if let Some(template) = template.as_any().downcast_ref::<EnumSocket>() {
            self.items = template.items.clone();
        }
    }

    kind_boilerplate!();
}

fn number_array(value: &Value) -> Option<Vec<f64>> {
    value.as_array()?.iter().map(Value::as_f64).collect()
}

/// Copy leading components of an array value into `target`
///
/// Shorter arrays leave the trailing components untouched so a vec3 value can
/// feed a vec4 socket.
fn load_components(
    target: &mut [f64],
    value: &Value,
    socket_type: &str,
) -> std::result::Result<(), SocketError> {
    let components = number_array(value).ok_or_else(|| SocketError::mismatch(socket_type, value))?;
    for (slot, v) in target.iter_mut().zip(components) {
        *slot = v;
    }
    Ok(())
}

fn component_distance(values: &[f64], other: &Value) -> f64 {
    match number_array(other) {
        Some(o) if o.len() == values.len() => values
            .iter()
            .zip(o)
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f64>()
            .sqrt(),
        _ => f64::NAN,
    }
}

macro_rules! vector_socket {
    (
        $(#[$meta:meta])*
        $name:ident, $len:expr, $type_name:expr, [$($lineage:expr),+], $default:expr
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq)]
        pub struct $name(pub [f64; $len]);

        impl Default for $name {
            fn default() -> Self {
                Self($default)
            }
        }

        impl $name {
            pub fn new(value: [f64; $len]) -> Self {
                Self(value)
            }
        }

        impl SocketKind for $name {
            fn type_name(&self) -> &'static str {
                $type_name
            }

            fn lineage(&self) -> &'static [&'static str] {
                &[$($lineage),+]
            }

            fn value(&self) -> Value {
                json!(self.0.to_vec())
            }

            fn set_value(&mut self, value: &Value) -> std::result::Result<(), SocketError> {
                load_components(&mut self.0, value, $type_name)
            }

            fn diff_value(&self, other: &Value) -> f64 {
                component_distance(&self.0, other)
            }

            kind_boilerplate!();
        }
    };
}

vector_socket! {
    /// Two-component vector
    Vec2Socket, 2, "vec2", ["vec2"], [0.0; 2]
}

vector_socket! {
    /// Three-component vector
    Vec3Socket, 3, "vec3", ["vec3"], [0.0; 3]
}

vector_socket! {
    /// Four-component vector
    Vec4Socket, 4, "vec4", ["vec4"], [0.0; 4]
}

vector_socket! {
    /// RGB color, a refinement of vec3
    RgbSocket, 3, "rgb", ["rgb", "vec3"], [0.0; 3]
}

vector_socket! {
    /// RGBA color, a refinement of vec4; opaque black by default
    RgbaSocket, 4, "rgba", ["rgba", "vec4"], [0.0, 0.0, 0.0, 1.0]
}

const IDENTITY: [f64; 16] = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];

/// 4x4 matrix, row-major, identity by default
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mat4Socket(pub [f64; 16]);

impl Default for Mat4Socket {
    fn default() -> Self {
        Self(IDENTITY)
    }
}

impl SocketKind for Mat4Socket {
    fn type_name(&self) -> &'static str {
        "mat4"
    }

    fn lineage(&self) -> &'static [&'static str] {
        &["mat4"]
    }

    fn value(&self) -> Value {
        json!(self.0.to_vec())
    }

    fn set_value(&mut self, value: &Value) -> std::result::Result<(), SocketError> {
        match number_array(value) {
            Some(m) if m.len() == 16 => {
                self.0.copy_from_slice(&m);
                Ok(())
            }
            _ => Err(SocketError::mismatch("mat4", value)),
        }
    }

    fn diff_value(&self, other: &Value) -> f64 {
        match number_array(other) {
            Some(m) if m.len() == 16 => self.0.iter().zip(m).map(|(a, b)| (a - b).abs()).sum(),
            _ => f64::NAN,
        }
    }

    kind_boilerplate!();
}

/// Constructor for a registered socket kind
pub type SocketConstructor = fn() -> Box<dyn SocketKind>;

fn boxed<T: SocketKind + Default>() -> Box<dyn SocketKind> {
    Box::new(T::default())
}

/// Socket kinds by type name, used when rebuilding sockets from a save
#[derive(Debug, Clone, Default)]
pub struct SocketRegistry {
    kinds: HashMap<String, SocketConstructor>,
}

impl SocketRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every standard kind
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register("float", boxed::<FloatSocket>);
        registry.register("int", boxed::<IntSocket>);
        registry.register("bool", boxed::<BoolSocket>);
        registry.register("depend", boxed::<DependSocket>);
        registry.register("enum", boxed::<EnumSocket>);
        registry.register("vec2", boxed::<Vec2Socket>);
        registry.register("vec3", boxed::<Vec3Socket>);
        registry.register("vec4", boxed::<Vec4Socket>);
        registry.register("rgb", boxed::<RgbSocket>);
        registry.register("rgba", boxed::<RgbaSocket>);
        registry.register("mat4", boxed::<Mat4Socket>);
        registry
    }

    /// Register or replace a kind
    pub fn register(&mut self, type_name: impl Into<String>, constructor: SocketConstructor) {
        self.kinds.insert(type_name.into(), constructor);
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.kinds.contains_key(type_name)
    }

    /// Build a default-valued kind
    pub fn create(&self, type_name: &str) -> Result<Box<dyn SocketKind>> {
        self.kinds
            .get(type_name)
            .map(|constructor| constructor())
            .ok_or_else(|| GraphError::UnknownSocketType(type_name.to_string()))
    }
}
