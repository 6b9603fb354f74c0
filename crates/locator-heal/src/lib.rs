//! Persisted UI locators with model-assisted self-healing.
//!
//! The remote interface changes shape without notice, so the selectors for
//! the three roles the engine depends on (input, submit, response) are kept
//! in a small persisted map and re-derived by a repair model whenever one
//! of them stops matching.

pub mod doctor;
pub mod errors;
pub mod keys;
pub mod store;

pub use doctor::{LocatorDoctor, ModelDoctor, ModelDoctorConfig};
pub use errors::HealError;
pub use keys::KeyRing;
pub use store::{LocatorMap, LocatorRole, LocatorStore};
