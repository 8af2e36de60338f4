//! Local session-token vault for the Passenger CLI.
//!
//! After a successful login the server hands back an opaque bearer token.
//! This crate caches it between separate CLI invocations without leaving a
//! recoverable plaintext copy on disk, and makes it expire five minutes
//! after it was stored.
//!
//! # Modules
//!
//! - [`clock`]: injectable time source.
//! - [`crypto`]: identity-derived keys, AES-256-GCM sealing.
//! - [`record`]: the token record and its file encoding.
//! - [`identity`]: local user identity, storage directory, file naming.
//! - [`eraser`]: overwrite-then-delete.
//! - [`sweep`]: removal of other expired token files.
//! - [`lock`]: cross-process advisory lock.
//! - [`store`]: the [`TokenStore`] tying it all together.
//! - [`error`]: unified error type.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use passenger_vault::TokenStore;
//!
//! # fn example() -> passenger_vault::Result<()> {
//! let store = TokenStore::open_default()?;
//! store.store_token("tok-abc123")?;
//!
//! match store.get_valid_token() {
//!     Ok(token) => println!("authenticated ({} chars)", token.len()),
//!     Err(e) if e.requires_login() => println!("please log in again"),
//!     Err(e) => return Err(e),
//! }
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod crypto;
pub mod eraser;
pub mod error;
pub mod identity;
pub mod lock;
pub mod record;
pub mod store;
pub mod sweep;

pub use clock::{Clock, ManualClock, SystemClock};
pub use eraser::{EraseInspector, SecureEraser};
pub use error::{Result, VaultError};
pub use record::{TOKEN_TTL, TokenRecord};
pub use store::{TokenStatus, TokenStore};
pub use sweep::{ExpirySweeper, SweepReport};
