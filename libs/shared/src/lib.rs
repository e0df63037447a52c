//! Types shared by the scheduler and the switcher: the signal bus, the events
//! that travel over it, and the program/settings payloads they carry.

pub mod bus;
pub mod events;
pub mod program;
pub mod settings;

pub use bus::{BusError, Event, SignalBus, SubscriptionId};
pub use program::{DEFAULT_PROGRAM_ID, NO_PROGRAM_TITLE, Program, display_title, is_same_program};
pub use settings::Settings;
