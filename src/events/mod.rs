//! Runtime event bus and event types.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{RuntimeEvent, RuntimeEventKind};
