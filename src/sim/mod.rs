pub mod driver;
pub mod event;
pub mod rng;

pub use driver::{SimulationDriver, StatusSnapshot};
pub use event::{Event, EventKind, EventQueue};
pub use rng::SimRng;

#[cfg(test)]
mod tests;
