//! hubbub - channel routing and chatter persistence for shared chat servers.
//!
//! Messages are routed into named channels gated by conditions, and each
//! user's chat preferences are kept in a chatter that is loaded and saved
//! in the background.

pub mod app;
pub mod channel;
pub mod chatter;
pub mod command;
pub mod condition;
pub mod config;
pub mod error;
pub mod logging;
pub mod recipient;
pub mod text;

pub use app::{ChatApp, ChatOutcome, ADMIN_PERMISSION};
pub use channel::{Channel, ChannelRegistry, DeliveryReport, Icon, SimpleChannel};
pub use chatter::{
    Chatter, ChatterKind, ChatterProvider, ChatterRecord, ChatterService, ChatterState,
    ChatterStorage, JsonFileStorage, MemoryStorage, PersistOptions, PersistTicket,
    SimpleChatterProvider,
};
pub use command::{parse_command, ChannelsCommand, CommandError};
pub use condition::{parse_conditions, Condition, ConditionContext, ConditionError, ConditionKind};
pub use config::Config;
pub use error::{ChatError, Result};
pub use recipient::{LocalDirectory, LocalRecipient, Recipient, RecipientDirectory};
pub use text::{Color, RichText, Style};
