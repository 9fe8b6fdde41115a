pub mod authority;
pub mod cli;
pub mod clock;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod host;
pub mod ledger;
pub mod passphrase;
pub mod registry;
pub mod token;
pub mod types;

pub use authority::SharedAuthority;
pub use dispatcher::DispatcherAccount;
pub use error::{CustodyError, Result};
pub use registry::AccountRegistry;
pub use types::{Address, Amount, Caller, Timestamp};
