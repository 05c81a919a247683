//! Core functionalities.
mod env;
mod policy;
mod step;
pub use env::Env;
pub use policy::Policy;
use std::fmt::Debug;
pub use step::{Info, Step};

/// A batch of observations, one row per environment instance.
pub trait Obs: Clone + Debug {
    /// Returns the number of environment instances covered by the object.
    fn len(&self) -> usize;

    /// Returns `true` if the object holds no observation.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A batch of actions, one row per environment instance.
pub trait Act: Clone + Debug {
    /// Returns the number of environment instances covered by the object.
    fn len(&self) -> usize;

    /// Returns `true` if the object holds no action.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
