pub mod channel;
pub mod clip;
pub mod ik;
pub mod instance;
pub mod node;
pub mod rig;
pub mod skinning;

pub use instance::ModelInstance;
pub use rig::{RigLibrary, RigTemplate};
