// SPDX-License-Identifier: MIT OR Apache-2.0
//! Keyframe nodes.

use crate::boxed::{lerp_f32, Boxed};
use serde::{Deserialize, Serialize};

/// A single timestamped value sample on a path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Time of the sample, normalized to the owning controller's length
    pub t: f32,
    /// Value at this time
    pub value: Boxed,
}

impl Node {
    /// Create a new node
    pub fn new(t: f32, value: impl Into<Boxed>) -> Self {
        Self {
            t,
            value: value.into(),
        }
    }

    /// Interpolate between two nodes at time `t`.
    ///
    /// `a` and `b` must hold values of the same type. Discrete types are
    /// never blended: they hold `a` until `t` reaches `b.t`.
    pub fn lerp(a: &Node, b: &Node, t: f32) -> Boxed {
        if !a.value.property_type().is_interpolable() {
            return if b.t > a.t && t >= b.t {
                b.value.clone()
            } else {
                a.value.clone()
            };
        }

        let range = b.t - a.t;
        let factor = if range != 0.0 { (t - a.t) / range } else { 0.0 };

        // Exact endpoints, so sampling on a keyframe never drifts
        if factor == 0.0 {
            return a.value.clone();
        }
        if factor == 1.0 {
            return b.value.clone();
        }

        match (&a.value, &b.value) {
            (Boxed::Float(va), Boxed::Float(vb)) => Boxed::Float(lerp_f32(*va, *vb, factor)),
            (Boxed::Double(va), Boxed::Double(vb)) => {
                Boxed::Double(va + (vb - va) * f64::from(factor))
            }
            (Boxed::Integer(va), Boxed::Integer(vb)) => {
                let v = lerp_f64(f64::from(*va), f64::from(*vb), factor);
                Boxed::Integer(v.round_ties_even() as i32)
            }
            (Boxed::Uint32(va), Boxed::Uint32(vb)) => {
                let v = lerp_f64(f64::from(*va), f64::from(*vb), factor);
                Boxed::Uint32(v.round_ties_even() as u32)
            }
            (Boxed::Vec3(va), Boxed::Vec3(vb)) => Boxed::Vec3([
                lerp_f32(va[0], vb[0], factor),
                lerp_f32(va[1], vb[1], factor),
                lerp_f32(va[2], vb[2], factor),
            ]),
            (Boxed::Vec4(va), Boxed::Vec4(vb)) => Boxed::Vec4([
                lerp_f32(va[0], vb[0], factor),
                lerp_f32(va[1], vb[1], factor),
                lerp_f32(va[2], vb[2], factor),
                lerp_f32(va[3], vb[3], factor),
            ]),
            (Boxed::Color(va), Boxed::Color(vb)) => Boxed::Color(va.lerp(vb, factor)),
            (Boxed::Quaternion(va), Boxed::Quaternion(vb)) => {
                Boxed::Quaternion(va.nlerp(vb, factor))
            }
            // Mismatched types can't come out of a type-checked path
            _ => a.value.clone(),
        }
    }
}

fn lerp_f64(a: f64, b: f64, factor: f32) -> f64 {
    a + (b - a) * f64::from(factor)
}
