//! Named coordinate frames and the transforms between them.
//!
//! Only positions are carried across frames. A point is treated as a pose
//! with identity orientation, so the rotation of a transform acts on the
//! position and nothing else is tracked.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use nalgebra::{Isometry3, Point3};
use serde::{Deserialize, Serialize};

use crate::CalibrationError;

/// A 3D point tagged with the frame it is expressed in.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FramePoint {
    pub frame: String,
    pub position: Point3<f64>,
}

impl FramePoint {
    pub fn new(frame: impl Into<String>, position: Point3<f64>) -> Self {
        Self {
            frame: frame.into(),
            position,
        }
    }
}

/// Rigid transform taking `child` coordinates into `parent` coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct FramePose {
    pub parent: String,
    pub child: String,
    pub parent_from_child: Isometry3<f64>,
    pub stamp: Instant,
}

/// Source of frame-to-frame transforms.
pub trait FrameTransformer: Send + Sync {
    /// Non-blocking check that `source` can be expressed in `target`.
    fn can_transform(&self, target: &str, source: &str) -> bool;

    /// Express `point` in `target`, waiting at most `timeout` for the
    /// transform to become available.
    fn transform(
        &self,
        point: &FramePoint,
        target: &str,
        timeout: Duration,
    ) -> Result<FramePoint, CalibrationError>;
}

impl<T: FrameTransformer + ?Sized> FrameTransformer for Arc<T> {
    fn can_transform(&self, target: &str, source: &str) -> bool {
        (**self).can_transform(target, source)
    }

    fn transform(
        &self,
        point: &FramePoint,
        target: &str,
        timeout: Duration,
    ) -> Result<FramePoint, CalibrationError> {
        (**self).transform(point, target, timeout)
    }
}

type EdgeMap = HashMap<(String, String), FramePose>;

/// In-process frame graph.
///
/// Edges are parent -> child rigid transforms. Lookups walk the shortest
/// path through the graph in either direction.
#[derive(Debug, Default)]
pub struct TransformBuffer {
    edges: Mutex<EdgeMap>,
    updated: Condvar,
}

impl TransformBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the `parent -> child` transform and wake pending lookups.
    pub fn set_transform(
        &self,
        parent: impl Into<String>,
        child: impl Into<String>,
        parent_from_child: Isometry3<f64>,
    ) {
        let parent = parent.into();
        let child = child.into();
        log::debug!("transform {parent} -> {child} updated");
        let pose = FramePose {
            parent: parent.clone(),
            child: child.clone(),
            parent_from_child,
            stamp: Instant::now(),
        };
        self.lock().insert((parent, child), pose);
        self.updated.notify_all();
    }

    /// Transform taking `source` coordinates into `target` coordinates.
    pub fn lookup(&self, target: &str, source: &str) -> Result<Isometry3<f64>, CalibrationError> {
        resolve(&self.lock(), target, source)
    }

    fn lock(&self) -> MutexGuard<'_, EdgeMap> {
        self.edges.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl FrameTransformer for TransformBuffer {
    fn can_transform(&self, target: &str, source: &str) -> bool {
        resolve(&self.lock(), target, source).is_ok()
    }

    fn transform(
        &self,
        point: &FramePoint,
        target: &str,
        timeout: Duration,
    ) -> Result<FramePoint, CalibrationError> {
        let deadline = Instant::now() + timeout;
        let mut edges = self.lock();
        loop {
            match resolve(&edges, target, &point.frame) {
                Ok(iso) => return Ok(FramePoint::new(target, iso * point.position)),
                Err(err) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(err);
                    }
                    let (guard, _) = self
                        .updated
                        .wait_timeout(edges, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner);
                    edges = guard;
                }
            }
        }
    }
}

fn unavailable(target: &str, source: &str, reason: String) -> CalibrationError {
    CalibrationError::TransformUnavailable {
        source_frame: source.to_string(),
        target_frame: target.to_string(),
        reason,
    }
}

/// Breadth-first walk from `source` accumulating `node_from_source`.
fn resolve(edges: &EdgeMap, target: &str, source: &str) -> Result<Isometry3<f64>, CalibrationError> {
    if source == target {
        return Ok(Isometry3::identity());
    }

    let mut adjacency: HashMap<&str, Vec<(&str, Isometry3<f64>)>> = HashMap::new();
    for ((parent, child), pose) in edges {
        let iso = pose.parent_from_child;
        adjacency
            .entry(child.as_str())
            .or_default()
            .push((parent.as_str(), iso));
        adjacency
            .entry(parent.as_str())
            .or_default()
            .push((child.as_str(), iso.inverse()));
    }

    for frame in [source, target] {
        if !adjacency.contains_key(frame) {
            return Err(unavailable(
                target,
                source,
                format!("frame '{frame}' does not exist"),
            ));
        }
    }

    let mut visited: HashSet<&str> = HashSet::from([source]);
    let mut queue = VecDeque::from([(source, Isometry3::identity())]);
    while let Some((node, node_from_source)) = queue.pop_front() {
        if node == target {
            return Ok(node_from_source);
        }
        for &(next, next_from_node) in adjacency.get(node).into_iter().flatten() {
            if visited.insert(next) {
                queue.push_back((next, next_from_node * node_from_source));
            }
        }
    }

    Err(unavailable(
        target,
        source,
        "frames are not connected".to_string(),
    ))
}
