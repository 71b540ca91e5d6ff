//! The virtual window scene and what the GPU pass needs to draw it.
//!
//! The scene is turned into a [`SceneMesh`] of lit triangles and flat colored
//! lines, and a view projection matrix for a camera placed at the viewer's
//! head. Rasterization happens in [`crate::gpu`].

use crate::config::SceneConfig;
use crate::geometry::HeadPosition;
use crate::Result;
use nalgebra::{Isometry3, Matrix4, Perspective3, Point3, Translation3, Unit, UnitQuaternion, Vector3};
use opencv::core::{Rect, Size};
use opencv::imgproc;
use opencv::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowDimensions {
    pub width: i32,
    pub height: i32,
}

impl WindowDimensions {
    pub fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    pub fn aspect(&self) -> f64 {
        if self.height <= 0 {
            return 1.0;
        }
        f64::from(self.width) / f64::from(self.height)
    }
}

/// Linear RGB color with components in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

impl Color {
    pub const RED: Color = Color::new(1.0, 0.0, 0.0);
    pub const GREEN: Color = Color::new(0.0, 1.0, 0.0);
    pub const BLUE: Color = Color::new(0.0, 0.0, 1.0);
    pub const YELLOW: Color = Color::new(1.0, 1.0, 0.0);
    pub const MAGENTA: Color = Color::new(1.0, 0.0, 1.0);
    pub const CYAN: Color = Color::new(0.0, 1.0, 1.0);

    pub const fn new(r: f64, g: f64, b: f64) -> Self {
        Self { r, g, b }
    }

    pub const fn gray(value: f64) -> Self {
        Self::new(value, value, value)
    }

    pub fn to_array(self) -> [f32; 3] {
        [self.r as f32, self.g as f32, self.b as f32]
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Light {
    Point { position: Point3<f64>, diffuse: Color },
    /// `direction` points towards the light
    Directional { direction: Vector3<f64>, diffuse: Color },
}

impl Light {
    /// Homogeneous light position, `w == 0` for directional lights.
    pub fn position(&self) -> [f32; 4] {
        match self {
            Light::Point { position, .. } => {
                [position.x as f32, position.y as f32, position.z as f32, 1.0]
            }
            Light::Directional { direction, .. } => {
                [direction.x as f32, direction.y as f32, direction.z as f32, 0.0]
            }
        }
    }

    pub fn diffuse(&self) -> Color {
        match self {
            Light::Point { diffuse, .. } | Light::Directional { diffuse, .. } => *diffuse,
        }
    }
}

/// Cube without top and bottom faces.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cube {
    pub center: Point3<f64>,
    pub half_size: f64,
    /// Rotation in degrees around `axis`
    pub angle: f64,
    pub axis: Vector3<f64>,
    pub color: Color,
}

struct Face {
    corners: [Point3<f64>; 4],
    normal: Vector3<f64>,
}

impl Cube {
    fn transform(&self) -> Isometry3<f64> {
        let rotation = Unit::try_new(self.axis, f64::EPSILON)
            .map(|axis| UnitQuaternion::from_axis_angle(&axis, self.angle.to_radians()))
            .unwrap_or_else(UnitQuaternion::identity);
        Isometry3::from_parts(Translation3::from(self.center.coords), rotation)
    }

    /// Side faces in world coordinates.
    fn faces(&self) -> Vec<Face> {
        let l = self.half_size;
        let local = [
            // front
            ([(-l, -l, l), (l, -l, l), (l, l, l), (-l, l, l)], Vector3::z()),
            // right
            ([(l, -l, -l), (l, l, -l), (l, l, l), (l, -l, l)], Vector3::x()),
            // back
            ([(-l, -l, -l), (-l, l, -l), (l, l, -l), (l, -l, -l)], -Vector3::z()),
            // left
            ([(-l, -l, -l), (-l, -l, l), (-l, l, l), (-l, l, -l)], -Vector3::x()),
        ];

        let transform = self.transform();
        local
            .iter()
            .map(|(corners, normal)| Face {
                corners: corners.map(|(x, y, z)| transform * Point3::new(x, y, z)),
                normal: transform.rotation * normal,
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    pub cubes: Vec<Cube>,
    pub ambient: Color,
    pub lights: Vec<Light>,
    pub axes_length: f64,
    pub screen_color: Color,
}

impl Scene {
    /// Three cubes around the origin, lit by a point and a directional light.
    pub fn virtual_window(axes_length: f64) -> Self {
        let cube = |center: (f64, f64, f64), half_size: f64, angle: f64, color: Color| Cube {
            center: Point3::new(center.0, center.1, center.2),
            half_size,
            angle,
            axis: Vector3::y(),
            color,
        };
        Self {
            cubes: vec![
                cube((0.0, 0.0, 0.0), 6.0, 30.0, Color::YELLOW),
                cube((-20.0, 0.0, -40.0), 4.0, 70.0, Color::MAGENTA),
                cube((5.0, 0.0, 10.0), 2.0, 10.0, Color::CYAN),
            ],
            ambient: Color::gray(0.2),
            lights: vec![
                Light::Point {
                    position: Point3::new(4.0, 0.0, 8.0),
                    diffuse: Color::gray(0.5),
                },
                Light::Directional {
                    direction: Vector3::new(-1.0, 0.5, 0.5),
                    diffuse: Color::new(0.5, 0.2, 0.2),
                },
            ],
            axes_length,
            screen_color: Color::RED,
        }
    }
}

/// Maps OpenGL clip depth `-w..w` to the `0..w` range wgpu expects.
#[rustfmt::skip]
fn gl_to_wgpu_depth() -> Matrix4<f64> {
    Matrix4::new(
        1.0, 0.0, 0.0, 0.0,
        0.0, 1.0, 0.0, 0.0,
        0.0, 0.0, 0.5, 0.5,
        0.0, 0.0, 0.0, 1.0,
    )
}

/// Projection times view for a camera at `eye` looking at the world origin.
pub fn view_projection(eye: &HeadPosition, window: WindowDimensions, config: &SceneConfig) -> Matrix4<f64> {
    let view = Isometry3::look_at_rh(eye, &Point3::origin(), &Vector3::y());
    let projection = Perspective3::new(
        window.aspect(),
        config.fov_y.to_radians(),
        config.near,
        config.far,
    );
    gl_to_wgpu_depth() * projection.to_homogeneous() * view.to_homogeneous()
}

/// Vertex layout shared with `shaders/scene.wgsl`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub color: [f32; 3],
}

impl Vertex {
    fn new(position: &Point3<f64>, normal: &Vector3<f64>, color: Color) -> Self {
        Self {
            position: [position.x as f32, position.y as f32, position.z as f32],
            normal: [normal.x as f32, normal.y as f32, normal.z as f32],
            color: color.to_array(),
        }
    }

    fn unlit(position: &Point3<f64>, color: Color) -> Self {
        Self::new(position, &Vector3::zeros(), color)
    }
}

/// Geometry for one frame: a triangle list drawn with lighting and a line
/// list drawn in flat color.
#[derive(Debug, Default, Clone)]
pub struct SceneMesh {
    pub triangles: Vec<Vertex>,
    pub lines: Vec<Vertex>,
}

impl SceneMesh {
    fn push_line(&mut self, a: &Point3<f64>, b: &Point3<f64>, color: Color) {
        self.lines.push(Vertex::unlit(a, color));
        self.lines.push(Vertex::unlit(b, color));
    }

    fn push_loop(&mut self, corners: &[Point3<f64>], color: Color) {
        for (index, corner) in corners.iter().enumerate() {
            self.push_line(corner, &corners[(index + 1) % corners.len()], color);
        }
    }
}

/// Builds the mesh for the scene seen through a window of the given size.
/// In wireframe mode the cube faces become outlines and the axes are added.
pub fn scene_mesh(scene: &Scene, window: WindowDimensions, screen_divisor: f64, wireframe: bool) -> SceneMesh {
    let mut mesh = SceneMesh::default();
    for cube in &scene.cubes {
        for face in cube.faces() {
            if wireframe {
                mesh.push_loop(&face.corners, cube.color);
                continue;
            }
            let [a, b, c, d] = face.corners;
            for corner in [a, b, c, a, c, d] {
                mesh.triangles.push(Vertex::new(&corner, &face.normal, cube.color));
            }
        }
    }

    if wireframe {
        let origin = Point3::origin();
        let length = scene.axes_length;
        mesh.push_line(&origin, &Point3::new(length, 0.0, 0.0), Color::RED);
        mesh.push_line(&origin, &Point3::new(0.0, length, 0.0), Color::GREEN);
        mesh.push_line(&origin, &Point3::new(0.0, 0.0, length), Color::BLUE);
    }

    mesh.push_loop(&screen_outline(window, screen_divisor), scene.screen_color);
    mesh
}

/// Corners of the physical screen outline in the z = 0 plane.
pub fn screen_outline(window: WindowDimensions, divisor: f64) -> [Point3<f64>; 4] {
    let cx = f64::from(window.width) / divisor;
    let cy = f64::from(window.height) / divisor;
    [
        Point3::new(cx, cy, 0.0),
        Point3::new(cx, -cy, 0.0),
        Point3::new(-cx, -cy, 0.0),
        Point3::new(-cx, cy, 0.0),
    ]
}

/// Draws the scene from the viewer's head into a BGR canvas the size of the window.
pub trait SceneRendering {
    fn render(&mut self, eye: &HeadPosition, window: WindowDimensions, wireframe: bool) -> Result<Mat>;
}

/// Scales `image` and pastes it into the bottom left corner of `canvas`,
/// dropping whatever does not fit.
pub fn composite_picture_in_picture(canvas: &mut Mat, image: &Mat, scale: f64) -> Result<()> {
    let source = image.size()?;
    let width = (f64::from(source.width) * scale).round() as i32;
    let height = (f64::from(source.height) * scale).round() as i32;
    if width <= 0 || height <= 0 {
        return Ok(());
    }

    let mut resized = Mat::default();
    imgproc::resize(
        image,
        &mut resized,
        Size::new(width, height),
        0.0,
        0.0,
        imgproc::INTER_CUBIC,
    )?;

    let target = canvas.size()?;
    let cols = width.min(target.width);
    let rows = height.min(target.height);
    let visible = Mat::roi(&resized, Rect::new(0, height - rows, cols, rows))?;
    let mut corner = canvas.roi_mut(Rect::new(0, target.height - rows, cols, rows))?;
    visible.copy_to(&mut corner)?;
    Ok(())
}
