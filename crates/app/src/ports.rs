//! Port definitions: traits that adapters implement.
//!
//! Ports are the boundaries between the application core and the outside world.
//! They are defined here (in `app`) so that both the use-case layer and the
//! adapter layer can depend on them without creating circular dependencies.

pub mod bus;
pub mod command_store;
pub mod device;

pub use bus::BusPublisher;
pub use command_store::CommandStore;
pub use device::{DeviceProvider, DeviceTransport};
