//! Visualization of world internals through a user-provided drawing backend.

use crate::{
    collision::AABB,
    math::{Pose, Vec2},
    settings::MAX_POLYGON_VERTICES,
    shape::Shape,
};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub(crate) fn darkened(self, factor: f32) -> Self {
        Self::rgba(factor * self.r, factor * self.g, factor * self.b, self.a)
    }
}

pub(crate) const STATIC_COLOR: Color = Color::rgb(0.5, 0.9, 0.5);
pub(crate) const KINEMATIC_COLOR: Color = Color::rgb(0.5, 0.5, 0.9);
pub(crate) const SLEEPING_COLOR: Color = Color::rgb(0.6, 0.6, 0.6);
pub(crate) const AWAKE_COLOR: Color = Color::rgb(0.9, 0.7, 0.7);
pub(crate) const JOINT_COLOR: Color = Color::rgb(0.5, 0.8, 0.8);
pub(crate) const AABB_COLOR: Color = Color::rgb(0.9, 0.3, 0.9);
pub(crate) const PAIR_COLOR: Color = Color::rgb(0.3, 0.9, 0.9);

bitflags::bitflags! {
    /// What [`World::debug_draw`][crate::World::debug_draw] should draw.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    #[cfg_attr(feature = "serde-types", derive(serde::Serialize, serde::Deserialize))]
    pub struct DrawFlags: u32 {
        const SHAPES = 0x0001;
        const JOINTS = 0x0002;
        const AABBS = 0x0004;
        /// Lines between the centers of bodies in contact.
        const PAIRS = 0x0008;
        const CENTER_OF_MASS = 0x0010;
    }
}

impl Default for DrawFlags {
    fn default() -> Self {
        DrawFlags::SHAPES | DrawFlags::JOINTS
    }
}

/// A drawing backend. Every method does nothing by default.
pub trait DebugDraw {
    /// Draw a closed polygon outline, counterclockwise.
    fn draw_polygon(&mut self, _vertices: &[Vec2], _color: Color) {}
    fn draw_solid_polygon(&mut self, _vertices: &[Vec2], _color: Color) {}
    fn draw_circle(&mut self, _center: Vec2, _radius: f64, _color: Color) {}
    /// Draw a filled circle. `axis` is a unit vector showing the rotation.
    fn draw_solid_circle(&mut self, _center: Vec2, _radius: f64, _axis: Vec2, _color: Color) {}
    fn draw_segment(&mut self, _p1: Vec2, _p2: Vec2, _color: Color) {}
    /// Draw the axes of a coordinate frame.
    fn draw_transform(&mut self, _pose: &Pose) {}
    fn draw_point(&mut self, _point: Vec2, _size: f64, _color: Color) {}
}

impl DebugDraw for () {}

pub(crate) fn draw_shape(draw: &mut dyn DebugDraw, shape: &Shape, pose: &Pose, color: Color) {
    match shape {
        Shape::Circle(c) => {
            let center = *pose * c.center;
            let axis = pose.rotation * Vec2::unit_x();
            draw.draw_solid_circle(center, c.radius, axis, color);
        }
        Shape::Polygon(p) => {
            let mut vertices = [Vec2::zero(); MAX_POLYGON_VERTICES];
            let count = p.vertices().len();
            for (target, v) in vertices.iter_mut().zip(p.vertices()) {
                *target = *pose * *v;
            }
            draw.draw_solid_polygon(&vertices[..count], color);
        }
        Shape::Edge(e) => {
            draw.draw_segment(*pose * e.v1, *pose * e.v2, color);
        }
        Shape::Chain(c) => {
            let vertex_color = color.darkened(0.75);
            for edge in c.edges() {
                let v1 = *pose * edge.v1;
                draw.draw_segment(v1, *pose * edge.v2, color);
                draw.draw_point(v1, 4.0, vertex_color);
            }
        }
    }
}

pub(crate) fn draw_aabb(draw: &mut dyn DebugDraw, aabb: &AABB, color: Color) {
    let corners = [
        aabb.min,
        Vec2::new(aabb.max.x, aabb.min.y),
        aabb.max,
        Vec2::new(aabb.min.x, aabb.max.y),
    ];
    draw.draw_polygon(&corners, color);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{math as m, shape::Polygon};

    #[derive(Default)]
    struct Recorder {
        polygons: Vec<Vec<Vec2>>,
        segments: usize,
    }

    impl DebugDraw for Recorder {
        fn draw_solid_polygon(&mut self, vertices: &[Vec2], _color: Color) {
            self.polygons.push(vertices.to_vec());
        }
        fn draw_segment(&mut self, _p1: Vec2, _p2: Vec2, _color: Color) {
            self.segments += 1;
        }
    }

    #[test]
    fn shapes_are_drawn_in_world_space() {
        let mut rec = Recorder::default();
        let square = Shape::Polygon(Polygon::new_box(1.0, 1.0).unwrap());
        let pose = m::pose_from(Vec2::new(5.0, 0.0), 0.0);
        draw_shape(&mut rec, &square, &pose, AWAKE_COLOR);
        assert_eq!(rec.polygons.len(), 1);
        assert_eq!(rec.polygons[0].len(), 4);
        assert!(rec.polygons[0].iter().all(|v| (v.x - 5.0).abs() <= 1.0 + 1e-12));

        let chain = Shape::Chain(crate::shape::Chain::new_loop(vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(0.0, 1.0),
        ]));
        draw_shape(&mut rec, &chain, &pose, STATIC_COLOR);
        assert_eq!(rec.segments, 3);
    }
}
