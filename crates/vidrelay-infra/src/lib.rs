//! Infrastructure shared by the vidrelay binaries: logging initialisation and
//! disk capacity checks for the file-based transfer topologies.

#[cfg(feature = "capacity")]
pub mod capacity;
pub mod telemetry;

#[cfg(feature = "capacity")]
pub use capacity::CapacityChecker;
pub use telemetry::{init_telemetry, LogFormat};
