// SPDX-License-Identifier: MIT OR Apache-2.0
//! Boxed property values.
//!
//! A [`Boxed`] value is a tagged union holding any one of the property
//! types that can be animated, constant-asserted or recorded in the undo
//! journal. Asset and object payloads are handles into arenas owned
//! elsewhere, so cloning a boxed value is always a cheap deep copy.

use crate::property::ObjectId;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for an asset referenced from a property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetId(pub Uuid);

impl AssetId {
    /// Create a new random asset ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AssetId {
    fn default() -> Self {
        Self::new()
    }
}

/// Type tag of a property or boxed value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyType {
    /// Single precision float
    Float,
    /// Double precision float
    Double,
    /// Signed integer
    Integer,
    /// Unsigned 32-bit integer
    Uint32,
    /// 3 component vector
    Vec3,
    /// 4 component vector
    Vec4,
    /// RGBA color
    Color,
    /// Rotation quaternion
    Quaternion,
    /// Enumeration value
    Enum,
    /// Boolean
    Boolean,
    /// UTF-8 text
    Text,
    /// Asset reference
    Asset,
    /// Object reference
    Object,
}

impl PropertyType {
    /// Get the display name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Float => "float",
            Self::Double => "double",
            Self::Integer => "integer",
            Self::Uint32 => "uint32",
            Self::Vec3 => "vec3",
            Self::Vec4 => "vec4",
            Self::Color => "color",
            Self::Quaternion => "quaternion",
            Self::Enum => "enum",
            Self::Boolean => "boolean",
            Self::Text => "text",
            Self::Asset => "asset",
            Self::Object => "object",
        }
    }

    /// Whether values of this type can be blended between keyframes.
    ///
    /// Discrete types hold the value of the earlier keyframe instead.
    pub fn is_interpolable(&self) -> bool {
        !matches!(
            self,
            Self::Enum | Self::Boolean | Self::Text | Self::Asset | Self::Object
        )
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// RGBA color with float components
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Color {
    /// Red channel
    pub red: f32,
    /// Green channel
    pub green: f32,
    /// Blue channel
    pub blue: f32,
    /// Alpha channel
    pub alpha: f32,
}

impl Color {
    /// Create a color from its components
    pub fn new(red: f32, green: f32, blue: f32, alpha: f32) -> Self {
        Self { red, green, blue, alpha }
    }

    /// Linear interpolation between two colors
    pub fn lerp(&self, other: &Color, factor: f32) -> Color {
        Color {
            red: lerp_f32(self.red, other.red, factor),
            green: lerp_f32(self.green, other.green, factor),
            blue: lerp_f32(self.blue, other.blue, factor),
            alpha: lerp_f32(self.alpha, other.alpha, factor),
        }
    }
}

/// Rotation quaternion
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    /// Scalar part
    pub w: f32,
    /// X component of the vector part
    pub x: f32,
    /// Y component of the vector part
    pub y: f32,
    /// Z component of the vector part
    pub z: f32,
}

impl Quaternion {
    /// The identity rotation
    pub const IDENTITY: Quaternion = Quaternion { w: 1.0, x: 0.0, y: 0.0, z: 0.0 };

    /// Create a quaternion from its components
    pub fn new(w: f32, x: f32, y: f32, z: f32) -> Self {
        Self { w, x, y, z }
    }

    /// Dot product of two quaternions
    pub fn dot(&self, other: &Quaternion) -> f32 {
        self.w * other.w + self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Normalized linear interpolation, taking the shortest arc
    pub fn nlerp(&self, other: &Quaternion, factor: f32) -> Quaternion {
        // Flip the target so we blend along the shorter arc
        let sign = if self.dot(other) < 0.0 { -1.0 } else { 1.0 };
        let blended = Quaternion {
            w: lerp_f32(self.w, other.w * sign, factor),
            x: lerp_f32(self.x, other.x * sign, factor),
            y: lerp_f32(self.y, other.y * sign, factor),
            z: lerp_f32(self.z, other.z * sign, factor),
        };

        let len = blended.dot(&blended).sqrt();
        if len == 0.0 {
            return *self;
        }

        Quaternion {
            w: blended.w / len,
            x: blended.x / len,
            y: blended.y / len,
            z: blended.z / len,
        }
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// A property value together with its type tag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Boxed {
    /// Float value
    Float(f32),
    /// Double value
    Double(f64),
    /// Integer value
    Integer(i32),
    /// Unsigned integer value
    Uint32(u32),
    /// 3D vector
    Vec3([f32; 3]),
    /// 4D vector
    Vec4([f32; 4]),
    /// Color (RGBA)
    Color(Color),
    /// Quaternion
    Quaternion(Quaternion),
    /// Enumeration value
    Enum(i32),
    /// Boolean
    Boolean(bool),
    /// Text
    Text(String),
    /// Asset handle
    Asset(AssetId),
    /// Object handle
    Object(ObjectId),
}

impl Boxed {
    /// Get the type tag of this value
    pub fn property_type(&self) -> PropertyType {
        match self {
            Boxed::Float(_) => PropertyType::Float,
            Boxed::Double(_) => PropertyType::Double,
            Boxed::Integer(_) => PropertyType::Integer,
            Boxed::Uint32(_) => PropertyType::Uint32,
            Boxed::Vec3(_) => PropertyType::Vec3,
            Boxed::Vec4(_) => PropertyType::Vec4,
            Boxed::Color(_) => PropertyType::Color,
            Boxed::Quaternion(_) => PropertyType::Quaternion,
            Boxed::Enum(_) => PropertyType::Enum,
            Boxed::Boolean(_) => PropertyType::Boolean,
            Boxed::Text(_) => PropertyType::Text,
            Boxed::Asset(_) => PropertyType::Asset,
            Boxed::Object(_) => PropertyType::Object,
        }
    }

    /// Create the zero value for a property type.
    ///
    /// Asset and object types have no natural zero and yield `None`.
    pub fn default_for(property_type: PropertyType) -> Option<Boxed> {
        let value = match property_type {
            PropertyType::Float => Boxed::Float(0.0),
            PropertyType::Double => Boxed::Double(0.0),
            PropertyType::Integer => Boxed::Integer(0),
            PropertyType::Uint32 => Boxed::Uint32(0),
            PropertyType::Vec3 => Boxed::Vec3([0.0; 3]),
            PropertyType::Vec4 => Boxed::Vec4([0.0; 4]),
            PropertyType::Color => Boxed::Color(Color::default()),
            PropertyType::Quaternion => Boxed::Quaternion(Quaternion::IDENTITY),
            PropertyType::Enum => Boxed::Enum(0),
            PropertyType::Boolean => Boxed::Boolean(false),
            PropertyType::Text => Boxed::Text(String::new()),
            PropertyType::Asset | PropertyType::Object => return None,
        };
        Some(value)
    }

    /// Get as float if possible
    pub fn as_float(&self) -> Option<f32> {
        match self {
            Boxed::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Get as Vec3 if possible
    pub fn as_vec3(&self) -> Option<[f32; 3]> {
        match self {
            Boxed::Vec3(v) => Some(*v),
            _ => None,
        }
    }

    /// Get as text if possible
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Boxed::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Widen a scalar numeric value to `f64`
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Boxed::Float(v) => Some(f64::from(*v)),
            Boxed::Double(v) => Some(*v),
            Boxed::Integer(v) | Boxed::Enum(v) => Some(f64::from(*v)),
            Boxed::Uint32(v) => Some(f64::from(*v)),
            Boxed::Boolean(v) => Some(if *v { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// Build a scalar value of the given type from an `f64`.
    ///
    /// Integer types round half to even and saturate at their bounds.
    pub fn from_f64(property_type: PropertyType, value: f64) -> Option<Boxed> {
        let boxed = match property_type {
            PropertyType::Float => Boxed::Float(value as f32),
            PropertyType::Double => Boxed::Double(value),
            PropertyType::Integer => Boxed::Integer(value.round_ties_even() as i32),
            PropertyType::Enum => Boxed::Enum(value.round_ties_even() as i32),
            PropertyType::Uint32 => Boxed::Uint32(value.round_ties_even() as u32),
            PropertyType::Boolean => Boxed::Boolean(value != 0.0),
            _ => return None,
        };
        Some(boxed)
    }
}

impl fmt::Display for Boxed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Boxed::Float(v) => write!(f, "{v:.3}"),
            Boxed::Double(v) => write!(f, "{v:.3}"),
            Boxed::Integer(v) | Boxed::Enum(v) => write!(f, "{v}"),
            Boxed::Uint32(v) => write!(f, "{v}"),
            Boxed::Vec3([x, y, z]) => write!(f, "({x:.3}, {y:.3}, {z:.3})"),
            Boxed::Vec4([x, y, z, w]) => write!(f, "({x:.3}, {y:.3}, {z:.3}, {w:.3})"),
            Boxed::Color(c) => write!(
                f,
                "rgba({:.3}, {:.3}, {:.3}, {:.3})",
                c.red, c.green, c.blue, c.alpha
            ),
            Boxed::Quaternion(q) => write!(f, "[{:.3} ({:.3}, {:.3}, {:.3})]", q.w, q.x, q.y, q.z),
            Boxed::Boolean(v) => f.write_str(if *v { "yes" } else { "no" }),
            Boxed::Text(v) => write!(f, "\"{v}\""),
            Boxed::Asset(id) => write!(f, "asset:{}", id.0),
            Boxed::Object(id) => write!(f, "object:{}", id.0),
        }
    }
}

impl From<f32> for Boxed {
    fn from(value: f32) -> Self {
        Boxed::Float(value)
    }
}

impl From<f64> for Boxed {
    fn from(value: f64) -> Self {
        Boxed::Double(value)
    }
}

impl From<bool> for Boxed {
    fn from(value: bool) -> Self {
        Boxed::Boolean(value)
    }
}

impl From<[f32; 3]> for Boxed {
    fn from(value: [f32; 3]) -> Self {
        Boxed::Vec3(value)
    }
}

impl From<&str> for Boxed {
    fn from(value: &str) -> Self {
        Boxed::Text(value.to_owned())
    }
}

/// Linear interpolation between two floats
pub(crate) fn lerp_f32(a: f32, b: f32, factor: f32) -> f32 {
    a + (b - a) * factor
}
