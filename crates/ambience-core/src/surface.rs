//! The shared mounting surface: one layer per running instance.
//!
//! Coordinates are normalized to the surface, `(0, 0)` top-left and `(1, 1)`
//! bottom-right. Elements may sit slightly outside while entering or leaving.

use std::collections::BTreeMap;
use std::time::Duration;

use bytemuck::{Pod, Zeroable};
use glam::Vec4;

use crate::trajectory::Trajectory;

/// A sub-container owned by exactly one running instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MountNode(u64);

/// Element ids carry their node, so two layers can never share one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId {
    pub node: MountNode,
    seq: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementRole {
    Primary,
    /// Short-lived reaction (splash, debris, flash) spawned by another element.
    Secondary,
}

/// One bounded-lifetime visual element.
#[derive(Debug, Clone)]
pub struct Element {
    pub trajectory: Trajectory,
    pub born: Duration,
    pub lifetime: Duration,
    pub size: f32,
    pub color: Vec4,
    pub role: ElementRole,
}

impl Element {
    /// Normalized age in [0, 1].
    pub fn progress(&self, now: Duration) -> f32 {
        if self.lifetime.is_zero() {
            return 1.0;
        }
        let age = now.saturating_sub(self.born).as_secs_f32();
        (age / self.lifetime.as_secs_f32()).clamp(0.0, 1.0)
    }
}

#[derive(Debug)]
pub struct Layer {
    node: MountNode,
    label: String,
    next_seq: u64,
    elements: BTreeMap<ElementId, Element>,
}

impl Layer {
    pub fn node(&self) -> MountNode {
        self.node
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn insert(&mut self, element: Element) -> ElementId {
        self.next_seq += 1;
        let id = ElementId {
            node: self.node,
            seq: self.next_seq,
        };
        self.elements.insert(id, element);
        id
    }

    pub fn remove(&mut self, id: ElementId) -> Option<Element> {
        self.elements.remove(&id)
    }

    pub fn get(&self, id: ElementId) -> Option<&Element> {
        self.elements.get(&id)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn element_ids(&self) -> impl Iterator<Item = ElementId> + '_ {
        self.elements.keys().copied()
    }

    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.elements.values()
    }
}

/// Packed per-element draw data, castable to bytes for a GPU or blit backend.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct ParticleInstance {
    /// xy = position, z = size, w = unused
    pub pos_size: [f32; 4],
    pub color: [f32; 4],
    /// x = rotation (radians), y = layer slot, z = progress, w = unused
    pub rotation_layer: [f32; 4],
}

#[derive(Debug)]
pub struct MountSurface {
    visible: bool,
    next_node: u64,
    layers: BTreeMap<MountNode, Layer>,
}

impl Default for MountSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl MountSurface {
    pub fn new() -> Self {
        Self {
            visible: true,
            next_node: 0,
            layers: BTreeMap::new(),
        }
    }

    /// Creates an empty layer labelled for debugging.
    pub fn mount(&mut self, label: impl Into<String>) -> MountNode {
        self.next_node += 1;
        let node = MountNode(self.next_node);
        self.layers.insert(
            node,
            Layer {
                node,
                label: label.into(),
                next_seq: 0,
                elements: BTreeMap::new(),
            },
        );
        node
    }

    /// Detaches the layer and everything in it.
    pub fn unmount(&mut self, node: MountNode) -> Option<Layer> {
        self.layers.remove(&node)
    }

    pub fn layer(&self, node: MountNode) -> Option<&Layer> {
        self.layers.get(&node)
    }

    pub fn layer_mut(&mut self, node: MountNode) -> Option<&mut Layer> {
        self.layers.get_mut(&node)
    }

    pub fn layers(&self) -> impl Iterator<Item = &Layer> {
        self.layers.values()
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Layers ever mounted on this surface.
    pub fn nodes_created(&self) -> u64 {
        self.next_node
    }

    pub fn element_count(&self) -> usize {
        self.layers.values().map(Layer::len).sum()
    }

    /// Drops every layer. Only valid once every owning instance has been torn down.
    pub fn clear(&mut self) {
        self.layers.clear();
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    /// Samples every element at `now`. A hidden surface yields nothing.
    pub fn snapshot(&self, now: Duration) -> Vec<ParticleInstance> {
        if !self.visible {
            return Vec::new();
        }
        let mut out = Vec::with_capacity(self.element_count());
        for (slot, layer) in self.layers.values().enumerate() {
            for element in layer.elements.values() {
                let t = element.progress(now);
                let pose = element.trajectory.sample(t);
                out.push(ParticleInstance {
                    pos_size: [
                        pose.position.x,
                        pose.position.y,
                        element.size * pose.scale,
                        0.0,
                    ],
                    color: [
                        element.color.x,
                        element.color.y,
                        element.color.z,
                        (element.color.w * pose.opacity).clamp(0.0, 1.0),
                    ],
                    rotation_layer: [pose.rotation, slot as f32, t, 0.0],
                });
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;

    fn element(born_ms: u64) -> Element {
        Element {
            trajectory: Trajectory::Twinkle {
                at: Vec2::new(0.5, 0.5),
                pulses: 1.0,
            },
            born: Duration::from_millis(born_ms),
            lifetime: Duration::from_millis(1000),
            size: 0.02,
            color: Vec4::ONE,
            role: ElementRole::Primary,
        }
    }

    #[test]
    fn layers_are_disjoint() {
        let mut surface = MountSurface::new();
        let a = surface.mount("rain");
        let b = surface.mount("snow");
        let ea = surface.layer_mut(a).unwrap().insert(element(0));
        let eb = surface.layer_mut(b).unwrap().insert(element(0));
        assert_ne!(ea, eb);
        assert_eq!(ea.node, a);
        assert!(surface.layer(b).unwrap().get(ea).is_none());
        assert!(surface.layer_mut(b).unwrap().remove(ea).is_none());
        assert_eq!(surface.element_count(), 2);
    }

    #[test]
    fn unmount_drops_elements() {
        let mut surface = MountSurface::new();
        let node = surface.mount("fog");
        surface.layer_mut(node).unwrap().insert(element(0));
        let layer = surface.unmount(node).unwrap();
        assert_eq!(layer.len(), 1);
        assert_eq!(surface.layer_count(), 0);
        assert_eq!(surface.nodes_created(), 1);
    }

    #[test]
    fn progress_and_snapshot() {
        let mut surface = MountSurface::new();
        let node = surface.mount("stars");
        surface.layer_mut(node).unwrap().insert(element(0));
        let e = element(0);
        assert_eq!(e.progress(Duration::from_millis(500)), 0.5);
        assert_eq!(e.progress(Duration::from_millis(5000)), 1.0);

        let frame = surface.snapshot(Duration::from_millis(500));
        assert_eq!(frame.len(), 1);
        assert_eq!(frame[0].pos_size[0], 0.5);
        assert_eq!(bytemuck::cast_slice::<_, u8>(&frame).len(), 48);

        surface.set_visible(false);
        assert!(surface.snapshot(Duration::from_millis(500)).is_empty());
    }
}
