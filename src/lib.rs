//! World obstacles grouped into reusable, nestable definitions, expanded into
//! a flat world and exchanged in a compact binary form.

pub mod config;
pub mod group;
pub mod material;
pub mod math;
pub mod obstacle;
pub mod physics;
pub mod typed_id;
pub mod wire;
pub mod world_file;

pub use config::BuildConfig;
pub use group::{
    ExpansionReport, GroupDefinition, GroupDefinitionMgr, GroupInstance, ReferenceError,
};
pub use obstacle::{Obstacle, ObstacleType, Shape};
pub use typed_id::ObstacleId;
pub use wire::DecodeError;
