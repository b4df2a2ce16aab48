pub mod transform;

pub use glam::{Vec3, Vec4};
pub use transform::{Transform, TransformOp};
