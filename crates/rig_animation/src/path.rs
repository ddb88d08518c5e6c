// SPDX-License-Identifier: MIT OR Apache-2.0
//! Keyframe paths.
//!
//! A [`Path`] is the time-ordered list of [`Node`]s animating one property.
//! Node times are strictly increasing and a time holds at most one node.
//! The path remembers the last node it touched so that monotonic playback
//! finds its control points without rescanning from the head.

use crate::boxed::{Boxed, PropertyType};
use crate::error::{AnimationError, Result};
use crate::node::Node;
use serde::{Deserialize, Serialize};
use std::cell::Cell;

/// Playback direction used to pick control points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PathDirection {
    /// Moving towards later times
    #[default]
    Forwards,
    /// Moving towards earlier times
    Backwards,
}

/// Kind of change made to a path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PathOperation {
    /// A node was inserted
    Added,
    /// An existing node's value was replaced
    Modified,
    /// A node was removed
    Removed,
}

/// A change notification emitted by a path
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathChange {
    /// What happened
    pub op: PathOperation,
    /// Time of the affected node
    pub t: f32,
}

/// An ordered keyframe sequence for one property
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Path {
    /// Type of every node value
    property_type: PropertyType,
    /// Nodes sorted by time
    nodes: Vec<Node>,
    /// Index of the last accessed node
    #[serde(skip)]
    cursor: Cell<Option<usize>>,
    /// Changes not yet collected by the owner
    #[serde(skip)]
    changes: Vec<PathChange>,
}

impl Path {
    /// Create an empty path for a property type
    pub fn new(property_type: PropertyType) -> Self {
        Self {
            property_type,
            nodes: Vec::new(),
            cursor: Cell::new(None),
            changes: Vec::new(),
        }
    }

    /// Get the property type of this path
    pub fn property_type(&self) -> PropertyType {
        self.property_type
    }

    /// Get all nodes in time order
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Get the node count
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the path has no nodes
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Latest node time, if any
    pub fn max_t(&self) -> Option<f32> {
        self.nodes.last().map(|n| n.t)
    }

    /// Index of the node at exactly `t`, or where it would be inserted
    fn position(&self, t: f32) -> std::result::Result<usize, usize> {
        let idx = self.nodes.partition_point(|n| n.t < t);
        match self.nodes.get(idx) {
            Some(node) if node.t == t => Ok(idx),
            _ => Err(idx),
        }
    }

    /// Find the node at exactly time `t`
    pub fn find_node(&self, t: f32) -> Option<&Node> {
        self.position(t).ok().map(|idx| &self.nodes[idx])
    }

    /// Find the node closest to time `t`; ties pick the earlier node
    pub fn find_nearest(&self, t: f32) -> Option<&Node> {
        self.nearest_index(t).map(|idx| &self.nodes[idx])
    }

    fn nearest_index(&self, t: f32) -> Option<usize> {
        if self.nodes.is_empty() {
            return None;
        }

        let idx = self.nodes.partition_point(|n| n.t < t);
        if idx == 0 {
            return Some(0);
        }
        if idx == self.nodes.len() {
            return Some(idx - 1);
        }

        let before = (self.nodes[idx - 1].t - t).abs();
        let after = (self.nodes[idx].t - t).abs();
        Some(if before <= after { idx - 1 } else { idx })
    }

    /// Box the value of the node at exactly time `t`
    pub fn get_boxed(&self, t: f32) -> Option<Boxed> {
        self.find_node(t).map(|n| n.value.clone())
    }

    fn check_value(&self, value: &Boxed) -> Result<()> {
        let found = value.property_type();
        if found != self.property_type {
            return Err(AnimationError::TypeMismatch {
                expected: self.property_type,
                found,
            });
        }
        Ok(())
    }

    /// Insert a value at time `t`.
    ///
    /// An existing node at exactly `t` has its value replaced.
    pub fn insert(&mut self, t: f32, value: impl Into<Boxed>) -> Result<PathOperation> {
        let value = value.into();
        self.check_value(&value)?;
        if t.is_nan() {
            return Err(AnimationError::InvalidTime(t));
        }

        let op = match self.position(t) {
            Ok(idx) => {
                self.nodes[idx].value = value;
                PathOperation::Modified
            }
            Err(idx) => {
                self.insert_at(idx, Node { t, value });
                PathOperation::Added
            }
        };

        self.changes.push(PathChange { op, t });
        tracing::trace!("path {:?} node at t={t}", op);
        Ok(op)
    }

    /// Insert a node whose time must not be occupied yet
    pub fn insert_node(&mut self, node: Node) -> Result<()> {
        self.check_value(&node.value)?;
        if node.t.is_nan() {
            return Err(AnimationError::InvalidTime(node.t));
        }

        match self.position(node.t) {
            Ok(_) => Err(AnimationError::NodeExists(node.t)),
            Err(idx) => {
                let t = node.t;
                self.insert_at(idx, node);
                self.changes.push(PathChange {
                    op: PathOperation::Added,
                    t,
                });
                Ok(())
            }
        }
    }

    fn insert_at(&mut self, idx: usize, node: Node) {
        self.nodes.insert(idx, node);
        if let Some(cursor) = self.cursor.get() {
            if cursor >= idx {
                self.cursor.set(Some(cursor + 1));
            }
        }
    }

    /// Remove the node at exactly time `t`
    pub fn remove(&mut self, t: f32) -> Option<Node> {
        let idx = self.position(t).ok()?;
        self.remove_node(idx)
    }

    /// Remove the node at `index` in time order
    pub fn remove_node(&mut self, index: usize) -> Option<Node> {
        if index >= self.nodes.len() {
            return None;
        }

        let node = self.nodes.remove(index);
        match self.cursor.get() {
            Some(cursor) if cursor == index => self.cursor.set(None),
            Some(cursor) if cursor > index => self.cursor.set(Some(cursor - 1)),
            _ => {}
        }

        self.changes.push(PathChange {
            op: PathOperation::Removed,
            t: node.t,
        });
        Some(node)
    }

    /// Remove the node nearest to time `t`
    pub fn remove_nearest(&mut self, t: f32) -> Option<Node> {
        let idx = self.nearest_index(t)?;
        self.remove_node(idx)
    }

    /// Find the two nodes bracketing `t`.
    ///
    /// Moving forwards the first point is the last node at or before `t`
    /// and the second is the node after it. Moving backwards the first
    /// point is the first node at or after `t` and the second is the node
    /// before it. Outside the path both points are the closest end node.
    pub fn find_control_points2(
        &self,
        t: f32,
        direction: PathDirection,
    ) -> Option<(&Node, &Node)> {
        let (i0, i1) = self.control_point_indices(t, direction)?;
        Some((&self.nodes[i0], &self.nodes[i1]))
    }

    fn control_point_indices(&self, t: f32, direction: PathDirection) -> Option<(usize, usize)> {
        if self.nodes.is_empty() {
            return None;
        }

        let last = self.nodes.len() - 1;
        let mut pos = self.cursor.get().filter(|&i| i <= last).unwrap_or(0);

        // A node at exactly t may only be the first control point in the
        // current direction.
        let pair = match direction {
            PathDirection::Forwards => {
                if self.nodes[pos].t > t {
                    match (0..=pos).rev().find(|&i| self.nodes[i].t <= t) {
                        Some(i) => pos = i,
                        None => {
                            self.cursor.set(Some(0));
                            return Some((0, 0));
                        }
                    }
                } else {
                    match (pos..=last).find(|&i| self.nodes[i].t > t) {
                        Some(i) => pos = i - 1,
                        None => {
                            self.cursor.set(Some(last));
                            return Some((last, last));
                        }
                    }
                }
                (pos, (pos + 1).min(last))
            }
            PathDirection::Backwards => {
                if self.nodes[pos].t > t {
                    match (0..=pos).rev().find(|&i| self.nodes[i].t < t) {
                        Some(i) => pos = i + 1,
                        None => {
                            self.cursor.set(Some(0));
                            return Some((0, 0));
                        }
                    }
                } else {
                    match (pos..=last).find(|&i| self.nodes[i].t >= t) {
                        Some(i) => pos = i,
                        None => {
                            self.cursor.set(Some(last));
                            return Some((last, last));
                        }
                    }
                }
                (pos, pos.saturating_sub(1))
            }
        };

        self.cursor.set(Some(pos));
        Some(pair)
    }

    /// Interpolate the path's value at time `t`
    pub fn lerp_property(&self, t: f32) -> Option<Boxed> {
        self.lerp_property_in(t, PathDirection::Forwards)
    }

    /// Interpolate at time `t`, scanning from the cursor in `direction`.
    ///
    /// The sampled value doesn't depend on the direction, only the scan does.
    pub fn lerp_property_in(&self, t: f32, direction: PathDirection) -> Option<Boxed> {
        let (n0, n1) = self.find_control_points2(t, direction)?;
        let (earlier, later) = if n1.t < n0.t { (n1, n0) } else { (n0, n1) };
        Some(Node::lerp(earlier, later, t))
    }

    /// Re-express every node time relative to a new length
    pub fn renormalize(&mut self, prev_length: f32, new_length: f32) {
        for node in &mut self.nodes {
            node.t *= prev_length;
            node.t /= new_length;
        }
    }

    /// Take the change notifications recorded since the last call
    pub fn drain_changes(&mut self) -> Vec<PathChange> {
        std::mem::take(&mut self.changes)
    }

    /// Log every node at debug level
    pub fn dump(&self) {
        tracing::debug!("path ({}) with {} nodes", self.property_type, self.nodes.len());
        for node in &self.nodes {
            tracing::debug!(" t = {:.4} value = {}", node.t, node.value);
        }
    }
}

impl PartialEq for Path {
    fn eq(&self, other: &Self) -> bool {
        self.property_type == other.property_type && self.nodes == other.nodes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn float_path(times: &[f32]) -> Path {
        let mut path = Path::new(PropertyType::Float);
        for (i, t) in times.iter().enumerate() {
            path.insert(*t, i as f32).unwrap();
        }
        path
    }

    fn is_sorted(path: &Path) -> bool {
        path.nodes().windows(2).all(|w| w[0].t < w[1].t)
    }

    #[test]
    fn test_insert_then_find() {
        let mut path = Path::new(PropertyType::Float);
        assert_eq!(path.insert(0.5, 1.0f32).unwrap(), PathOperation::Added);

        let node = path.find_node(0.5).unwrap();
        assert_eq!(node.value, Boxed::Float(1.0));
        assert_eq!(path.find_nearest(0.9).unwrap().t, 0.5);
    }

    #[test]
    fn test_insert_overwrites_existing_time() {
        let mut path = float_path(&[0.0, 0.5]);
        assert_eq!(path.insert(0.5, 7.0f32).unwrap(), PathOperation::Modified);
        assert_eq!(path.len(), 2);
        assert_eq!(path.get_boxed(0.5), Some(Boxed::Float(7.0)));
    }

    #[test]
    fn test_insert_type_mismatch() {
        let mut path = Path::new(PropertyType::Float);
        let err = path.insert(0.0, true).unwrap_err();
        assert!(matches!(err, AnimationError::TypeMismatch { .. }));
        assert!(path.is_empty());
    }

    #[test]
    fn test_insert_node_rejects_occupied_time() {
        let mut path = float_path(&[0.25]);
        let err = path.insert_node(Node::new(0.25, 3.0f32)).unwrap_err();
        assert!(matches!(err, AnimationError::NodeExists(_)));
        path.insert_node(Node::new(0.75, 3.0f32)).unwrap();
        assert_eq!(path.len(), 2);
    }

    #[test]
    fn test_sorted_after_mixed_edits() {
        let mut path = float_path(&[0.9, 0.1, 0.5, 0.3, 0.7]);
        assert!(is_sorted(&path));

        path.remove(0.5);
        path.insert(0.2, 1.0f32).unwrap();
        path.remove(0.42);
        path.insert(0.95, 1.0f32).unwrap();
        path.remove_nearest(0.0);

        assert!(is_sorted(&path));
        let times: Vec<f32> = path.nodes().iter().map(|n| n.t).collect();
        assert_eq!(times, vec![0.2, 0.3, 0.7, 0.9, 0.95]);
    }

    #[test]
    fn test_empty_path_lookups() {
        let path = Path::new(PropertyType::Vec3);
        assert!(path.find_node(0.0).is_none());
        assert!(path.find_nearest(0.0).is_none());
        assert!(path.find_control_points2(0.0, PathDirection::Forwards).is_none());
        assert!(path.lerp_property(0.3).is_none());
    }

    #[test]
    fn test_nearest_prefers_earlier_on_tie() {
        let path = float_path(&[0.2, 0.4]);
        assert_eq!(path.find_nearest(0.3).unwrap().t, 0.2);
        assert_eq!(path.find_nearest(0.31).unwrap().t, 0.4);
        assert_eq!(path.find_nearest(-1.0).unwrap().t, 0.2);
        assert_eq!(path.find_nearest(5.0).unwrap().t, 0.4);
    }

    #[test]
    fn test_control_points_forwards() {
        let path = float_path(&[0.0, 0.5, 1.0]);

        let (a, b) = path.find_control_points2(0.25, PathDirection::Forwards).unwrap();
        assert_eq!((a.t, b.t), (0.0, 0.5));

        // Exactly on a node picks the later pair
        let (a, b) = path.find_control_points2(0.5, PathDirection::Forwards).unwrap();
        assert_eq!((a.t, b.t), (0.5, 1.0));

        // Scanning back from the cursor
        let (a, b) = path.find_control_points2(0.1, PathDirection::Forwards).unwrap();
        assert_eq!((a.t, b.t), (0.0, 0.5));

        let (a, b) = path.find_control_points2(2.0, PathDirection::Forwards).unwrap();
        assert_eq!((a.t, b.t), (1.0, 1.0));
    }

    #[test]
    fn test_control_points_backwards() {
        let path = float_path(&[0.0, 0.5, 1.0]);

        let (a, b) = path.find_control_points2(0.75, PathDirection::Backwards).unwrap();
        assert_eq!((a.t, b.t), (1.0, 0.5));

        // Exactly on a node picks the earlier pair
        let (a, b) = path.find_control_points2(0.5, PathDirection::Backwards).unwrap();
        assert_eq!((a.t, b.t), (0.5, 0.0));

        let (a, b) = path.find_control_points2(-1.0, PathDirection::Backwards).unwrap();
        assert_eq!((a.t, b.t), (0.0, 0.0));
    }

    #[test]
    fn test_cursor_survives_removal() {
        let mut path = float_path(&[0.0, 0.5, 1.0]);
        path.find_control_points2(0.6, PathDirection::Forwards);
        path.remove(0.5);

        let (a, b) = path.find_control_points2(0.6, PathDirection::Forwards).unwrap();
        assert_eq!((a.t, b.t), (0.0, 1.0));
    }

    #[test]
    fn test_lerp_exact_on_nodes() {
        let mut path = Path::new(PropertyType::Float);
        path.insert(0.1, 0.3f32).unwrap();
        path.insert(0.7, 0.9f32).unwrap();
        path.insert(0.9, -2.0f32).unwrap();

        for node in path.nodes().to_vec() {
            assert_eq!(path.lerp_property(node.t), Some(node.value));
        }
        assert_eq!(path.lerp_property(0.4), Some(Boxed::Float(0.3 + (0.9 - 0.3) * 0.5)));
    }

    fn samples_of_every_type() -> Vec<[Boxed; 3]> {
        use crate::boxed::{AssetId, Color, Quaternion};
        use crate::property::ObjectId;

        vec![
            [Boxed::Float(0.3), Boxed::Float(-1.7), Boxed::Float(9.1)],
            [Boxed::Double(0.1), Boxed::Double(2.7), Boxed::Double(-3.3)],
            [Boxed::Integer(-3), Boxed::Integer(7), Boxed::Integer(12)],
            [Boxed::Uint32(1), Boxed::Uint32(40), Boxed::Uint32(3)],
            [
                Boxed::Vec3([0.1, 0.2, 0.3]),
                Boxed::Vec3([1.3, -0.7, 2.9]),
                Boxed::Vec3([5.0, 5.5, -6.1]),
            ],
            [
                Boxed::Vec4([0.1, 0.2, 0.3, 0.4]),
                Boxed::Vec4([1.7, 0.0, -2.2, 9.9]),
                Boxed::Vec4([0.3, 0.3, 0.3, 0.3]),
            ],
            [
                Boxed::Color(Color::new(0.1, 0.2, 0.3, 1.0)),
                Boxed::Color(Color::new(0.9, 0.7, 0.13, 0.5)),
                Boxed::Color(Color::new(0.0, 1.0, 0.33, 0.25)),
            ],
            [
                Boxed::Quaternion(Quaternion::new(1.0, 0.0, 0.0, 0.0)),
                Boxed::Quaternion(Quaternion::new(0.7071068, 0.0, 0.7071068, 0.0)),
                Boxed::Quaternion(Quaternion::new(0.5, 0.5, 0.5, 0.5)),
            ],
            [Boxed::Enum(1), Boxed::Enum(4), Boxed::Enum(2)],
            [Boxed::Boolean(true), Boxed::Boolean(false), Boxed::Boolean(true)],
            [Boxed::from("a"), Boxed::from("b"), Boxed::from("c")],
            [
                Boxed::Asset(AssetId::new()),
                Boxed::Asset(AssetId::new()),
                Boxed::Asset(AssetId::new()),
            ],
            [
                Boxed::Object(ObjectId::new()),
                Boxed::Object(ObjectId::new()),
                Boxed::Object(ObjectId::new()),
            ],
        ]
    }

    #[test]
    fn test_lerp_exact_on_nodes_for_every_type() {
        let samples = samples_of_every_type();
        assert_eq!(samples.len(), 13);

        for values in samples {
            let mut path = Path::new(values[0].property_type());
            for (t, value) in [0.1, 0.45, 0.8].into_iter().zip(values) {
                path.insert(t, value).unwrap();
            }

            for node in path.nodes().to_vec() {
                assert_eq!(path.lerp_property(node.t), Some(node.value.clone()));
                assert_eq!(
                    path.lerp_property_in(node.t, PathDirection::Backwards),
                    Some(node.value)
                );
            }
        }
    }

    #[test]
    fn test_lerp_backwards_matches_forwards() {
        let path = float_path(&[0.0, 0.25, 0.5, 1.0]);
        for t in [0.9, 0.6, 0.5, 0.3, 0.1, 0.0] {
            let backwards = path.lerp_property_in(t, PathDirection::Backwards);
            assert_eq!(backwards, path.lerp_property(t));
        }

        let mut steps = Path::new(PropertyType::Enum);
        steps.insert(0.0, Boxed::Enum(1)).unwrap();
        steps.insert(0.5, Boxed::Enum(2)).unwrap();
        assert_eq!(
            steps.lerp_property_in(0.25, PathDirection::Backwards),
            Some(Boxed::Enum(1))
        );
    }

    #[test]
    fn test_lerp_discrete_holds() {
        let mut path = Path::new(PropertyType::Enum);
        path.insert(0.0, Boxed::Enum(1)).unwrap();
        path.insert(0.5, Boxed::Enum(2)).unwrap();

        assert_eq!(path.lerp_property(0.25), Some(Boxed::Enum(1)));
        assert_eq!(path.lerp_property(0.5), Some(Boxed::Enum(2)));
        assert_eq!(path.lerp_property(0.9), Some(Boxed::Enum(2)));
    }

    #[test]
    fn test_changes_are_reported() {
        let mut path = Path::new(PropertyType::Float);
        path.insert(0.5, 1.0f32).unwrap();
        path.insert(0.5, 2.0f32).unwrap();
        path.remove(0.5);

        let ops: Vec<PathOperation> = path.drain_changes().iter().map(|c| c.op).collect();
        assert_eq!(
            ops,
            vec![PathOperation::Added, PathOperation::Modified, PathOperation::Removed]
        );
        assert!(path.drain_changes().is_empty());
    }

    #[test]
    fn test_renormalize() {
        let mut path = float_path(&[0.5, 1.0]);
        path.renormalize(5.0, 10.0);
        let times: Vec<f32> = path.nodes().iter().map(|n| n.t).collect();
        assert_eq!(times, vec![0.25, 0.5]);
    }

    #[test]
    fn test_serialization_keeps_nodes() {
        let path = float_path(&[0.0, 0.5]);
        let ron_str = ron::to_string(&path).unwrap();
        let loaded: Path = ron::from_str(&ron_str).unwrap();
        assert_eq!(loaded, path);
    }
}
