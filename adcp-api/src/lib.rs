//! # ADCP API
//!
//! Command table, attribute model and dispatcher for Sony projectors that
//! speak ADCP.
//!
//! Abstract command ids such as `POWER_ON` or `INPUT_HDMI1` are resolved
//! against a static table of [`CommandDescriptor`]s and executed by the
//! [`Dispatcher`], which adds repeat, hold and sequence semantics on top of a
//! [`CommandExecutor`].
//!
//! ```rust,ignore
//! use adcp_api::{Dispatcher, Invocation};
//! use tokio_util::sync::CancellationToken;
//!
//! let dispatcher = Dispatcher::new(session);
//! let report = dispatcher
//!     .invoke(&Invocation::parse("POWER_ON"), &CancellationToken::new())
//!     .await?;
//! ```

pub mod attribute;
pub mod command;
pub mod dispatcher;
pub mod error;
pub mod select;
pub mod value;

pub use attribute::{AttributeId, AttributeInfo, PollGroup, ValueKind, OPTIONS_QUERY};
pub use command::{resolve, CommandDescriptor, CommandKind, ParamRule};
pub use dispatcher::{
    DispatchError, DispatchReport, Dispatcher, DispatcherConfig, Executed, Invocation, Outcome,
};
pub use error::{ApiError, Result};
pub use select::{resolve_option, SelectAction};
pub use value::{AttributeValue, PowerState};

// Re-export the client types callers need alongside the API
pub use adcp_client::{
    CommandExecutor, DeviceError, ErrorCode, Reply, Session, SessionConfig, SessionError,
};
