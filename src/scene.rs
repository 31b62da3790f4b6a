//! External inputs read by the force engine each step.
//!
//! A [`Scene`] is owned by the caller and passed by reference into
//! [`Simulation::step`](crate::Simulation::step). The simulation never
//! mutates it, so it can be shared freely across worker threads.

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Infinite plane that pushes agents along its normal.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObstaclePlane {
    pub point: Vec3,
    /// Side the agents should stay on. Need not be normalized.
    pub normal: Vec3,
}

impl ObstaclePlane {
    pub fn new(point: Vec3, normal: Vec3) -> Self {
        Self { point, normal }
    }

    /// Normalized normal, `None` for a zero normal.
    pub fn unit_normal(&self) -> Option<Vec3> {
        self.normal.try_normalize()
    }

    /// Signed distance along the normalized normal, `None` for a zero normal.
    pub fn signed_distance(&self, position: Vec3) -> Option<f32> {
        Some(self.unit_normal()?.dot(position - self.point))
    }
}

/// Attractor or repeller at a fixed position.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PointSource {
    pub position: Vec3,
    #[serde(default)]
    pub attractive: bool,
    /// Kills agents inside the death distance.
    #[serde(default)]
    pub lethal: bool,
}

impl PointSource {
    pub fn attractor(position: Vec3) -> Self {
        Self {
            position,
            attractive: true,
            lethal: false,
        }
    }

    pub fn repeller(position: Vec3) -> Self {
        Self {
            position,
            attractive: false,
            lethal: false,
        }
    }

    pub fn lethal(mut self) -> Self {
        self.lethal = true;
        self
    }
}

/// Camera ray controlled by the user. Present in the scene only while active.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserRay {
    pub origin: Vec3,
    pub direction: Vec3,
    #[serde(default)]
    pub attract: bool,
    #[serde(default)]
    pub lethal: bool,
}

impl UserRay {
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction,
            attract: false,
            lethal: false,
        }
    }

    pub fn attracting(mut self) -> Self {
        self.attract = true;
        self
    }

    pub fn lethal(mut self) -> Self {
        self.lethal = true;
        self
    }

    /// Closest point on the half-line to `position`.
    pub fn closest_point(&self, position: Vec3) -> Vec3 {
        let Some(dir) = self.direction.try_normalize() else {
            return self.origin;
        };
        let t = (position - self.origin).dot(dir).max(0.0);
        self.origin + dir * t
    }
}

/// Obstacles, point sources and the optional user ray for one step.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scene {
    pub planes: Vec<ObstaclePlane>,
    pub points: Vec<PointSource>,
    pub user_ray: Option<UserRay>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Six inward-facing walls of the box `min..max`.
    pub fn room(min: Vec3, max: Vec3) -> Self {
        Self {
            planes: vec![
                ObstaclePlane::new(min, Vec3::X),
                ObstaclePlane::new(min, Vec3::Y),
                ObstaclePlane::new(min, Vec3::Z),
                ObstaclePlane::new(max, Vec3::NEG_X),
                ObstaclePlane::new(max, Vec3::NEG_Y),
                ObstaclePlane::new(max, Vec3::NEG_Z),
            ],
            ..Default::default()
        }
    }

    pub fn with_plane(mut self, plane: ObstaclePlane) -> Self {
        self.planes.push(plane);
        self
    }

    pub fn with_point(mut self, point: PointSource) -> Self {
        self.points.push(point);
        self
    }

    pub fn with_user_ray(mut self, ray: UserRay) -> Self {
        self.user_ray = Some(ray);
        self
    }

    /// Activates or clears the user ray.
    pub fn set_user_ray(&mut self, ray: Option<UserRay>) {
        self.user_ray = ray;
    }
}
