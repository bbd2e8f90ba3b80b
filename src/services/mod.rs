//! Services - business logic and state management
//!
//! This module contains the core search logic:
//! - `session` - Session controller: start/stop lifecycle and terminal states
//! - `scanner` - Detection loop matching vision events against the registry
//! - `navigator` - Navigation loop: aisle sweep, turns, completion authority
//! - `registry` - Wanted-item registry (the cart)
//! - `locations` - First-write-wins aisle location recorder

pub mod locations;
pub mod navigator;
pub mod registry;
pub mod scanner;
pub mod session;

// Re-export commonly used types
pub use locations::AisleLocationRecorder;
pub use navigator::{AisleCursor, NavEnd, Navigator};
pub use registry::{AddOutcome, RemoveOutcome, WantedItemRegistry};
pub use scanner::Scanner;
pub use session::{SessionController, StartError};
