use serde::{Deserialize, Serialize};
use std::ops::Mul;

/// Projected gaze position
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Target position in camera-local space, before any zoom scale
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn xy(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    pub fn to_array(self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }
}

impl From<[f32; 3]> for Vec3 {
    fn from(v: [f32; 3]) -> Self {
        Self::new(v[0], v[1], v[2])
    }
}

impl Mul<f32> for Vec3 {
    type Output = Vec3;

    fn mul(self, s: f32) -> Vec3 {
        Vec3::new(self.x * s, self.y * s, self.z * s)
    }
}

/// Read-only lookup of target positions by index
pub trait TargetCatalog {
    fn count(&self) -> usize;
    fn position_at(&self, index: usize) -> Option<Vec3>;

    /// Index presented when no other target is selected.
    fn central_index(&self) -> usize {
        self.count() / 2
    }
}

/// Per-frame projected gaze position
pub trait GazeSource {
    fn position(&self) -> Vec2;
}

#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    positions: Vec<Vec3>,
}

impl StaticCatalog {
    pub fn new(positions: Vec<Vec3>) -> Self {
        Self { positions }
    }

    /// 3x3 grid at `depth`, ordered like a numeric keypad (index 0 bottom-left, 4 centre).
    pub fn keypad_grid(spacing: f32, depth: f32) -> Self {
        let positions = (0..9)
            .map(|i| {
                let col = (i % 3) as f32 - 1.0;
                let row = (i / 3) as f32 - 1.0;
                Vec3::new(col * spacing, row * spacing, depth)
            })
            .collect();
        Self { positions }
    }
}

impl From<&[[f32; 3]]> for StaticCatalog {
    fn from(raw: &[[f32; 3]]) -> Self {
        Self::new(raw.iter().copied().map(Vec3::from).collect())
    }
}

impl TargetCatalog for StaticCatalog {
    fn count(&self) -> usize {
        self.positions.len()
    }

    fn position_at(&self, index: usize) -> Option<Vec3> {
        self.positions.get(index).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keypad_grid_centre_is_index_four() {
        let grid = StaticCatalog::keypad_grid(0.1, 1.0);
        assert_eq!(grid.count(), 9);
        assert_eq!(grid.central_index(), 4);
        assert_eq!(grid.position_at(4), Some(Vec3::new(0.0, 0.0, 1.0)));
        assert_eq!(grid.position_at(0), Some(Vec3::new(-0.1, -0.1, 1.0)));
        assert_eq!(grid.position_at(8), Some(Vec3::new(0.1, 0.1, 1.0)));
        assert_eq!(grid.position_at(9), None);
    }

    #[test]
    fn scaling_multiplies_every_axis() {
        let p = Vec3::new(0.2, -0.4, 1.0) * 1.5;
        assert!((p.x - 0.3).abs() < 1e-6);
        assert!((p.y + 0.6).abs() < 1e-6);
        assert!((p.z - 1.5).abs() < 1e-6);
    }
}
