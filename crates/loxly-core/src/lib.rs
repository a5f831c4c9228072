// loxly-core: Structure catalog, filtering and ordered event dispatch
// on top of the loxly-api wire protocol.

pub mod catalog;
pub mod client;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod filter;
pub mod stream;

pub use catalog::{ControlMeta, ControlSummary, RoomSummary, StructureCatalog};
pub use client::{Client, ConnectionState, ListenExit};
pub use config::ClientConfig;
pub use dispatcher::{Dispatcher, StateEvent};
pub use error::CoreError;
pub use filter::SubscriptionFilter;
pub use stream::{EventHandlers, EventStream};

pub use loxly_api::{StateId, StateValue};
