//! Change notifications for the fleet tables.
//!
//! A typed publish/subscribe bus: writers announce that a table changed,
//! subscribers (the view cache, live UIs) invalidate whatever they derived
//! from it. Events identify *what* changed, never the new state.

pub mod bus;
pub mod change;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{ChangeHandler, ChangeNotifier, Subscription, SubscriptionHandle};
pub use change::{ChangeEvent, Topic};
pub use envelope::ChangeEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryNotifier, InMemoryNotifierError};
