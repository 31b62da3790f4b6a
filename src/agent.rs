//! Per-agent state.
//!
//! An [`Agent`] is a plain `#[repr(C)]` record so that the same bytes can be
//! handed to a compute backend without conversion. The layout mirrors a WGSL
//! struct of `vec3<f32>, u32, vec3<f32>, u32` (32 bytes, 16-byte aligned
//! vectors).

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Small bitset carried by every agent.
///
/// Absence of [`Status::PREDATOR`] means prey. Death clears [`Status::ALIVE`];
/// agents are never removed so indices stay stable for the whole run.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable, Serialize, Deserialize)]
pub struct Status(pub u32);

impl Status {
    pub const PREDATOR: Status = Status(1);
    pub const ALIVE: Status = Status(2);

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Status) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn remove(&mut self, other: Status) {
        self.0 &= !other.0;
    }
}

impl std::ops::BitOr for Status {
    type Output = Status;

    fn bitor(self, rhs: Status) -> Status {
        Status(self.0 | rhs.0)
    }
}

/// One simulated flocking entity.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Agent {
    pub position: Vec3,
    pub status: Status,
    pub velocity: Vec3,
    pub(crate) _reserved: u32,
}

impl Agent {
    /// Creates an agent with an explicit status word.
    pub fn new(position: Vec3, velocity: Vec3, status: Status) -> Self {
        Self {
            position,
            status,
            velocity,
            _reserved: 0,
        }
    }

    /// A living prey agent.
    pub fn prey(position: Vec3, velocity: Vec3) -> Self {
        Self::new(position, velocity, Status::ALIVE)
    }

    /// A living predator.
    pub fn predator(position: Vec3, velocity: Vec3) -> Self {
        Self::new(position, velocity, Status::ALIVE | Status::PREDATOR)
    }

    pub fn is_alive(&self) -> bool {
        self.status.contains(Status::ALIVE)
    }

    pub fn is_predator(&self) -> bool {
        self.status.contains(Status::PREDATOR)
    }

    /// Clears the alive flag. Position and velocity are left as they were.
    pub fn kill(&mut self) {
        self.status.remove(Status::ALIVE);
    }

    pub fn speed(&self) -> f32 {
        self.velocity.length()
    }

    pub(crate) fn is_finite(&self) -> bool {
        self.position.is_finite() && self.velocity.is_finite()
    }
}

/// WGSL declaration matching [`Agent`].
#[cfg(feature = "gpu")]
pub(crate) const AGENT_WGSL_STRUCT: &str = r#"
struct Agent {
    position: vec3<f32>,
    status: u32,
    velocity: vec3<f32>,
    _reserved: u32,
};
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_layout() {
        assert_eq!(std::mem::size_of::<Agent>(), 32);
        assert_eq!(std::mem::size_of::<Status>(), 4);
    }

    #[test]
    fn test_status_flags() {
        let prey = Agent::prey(Vec3::ZERO, Vec3::X);
        assert!(prey.is_alive());
        assert!(!prey.is_predator());
        assert_eq!(prey.status, Status::ALIVE);

        let mut predator = Agent::predator(Vec3::ZERO, Vec3::X);
        assert!(predator.is_predator());
        assert_eq!(predator.status.bits(), 3);

        predator.kill();
        assert!(!predator.is_alive());
        assert!(predator.is_predator());
    }

    #[test]
    fn test_agent_bytes_round_trip() {
        let agent = Agent::predator(Vec3::new(1.0, 2.0, 3.0), Vec3::new(0.1, 0.2, 0.3));
        let bytes = bytemuck::bytes_of(&agent);
        let back: Agent = *bytemuck::from_bytes(bytes);
        assert_eq!(agent, back);
    }
}
