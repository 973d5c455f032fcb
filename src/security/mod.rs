//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound message:
//!     → block.rs (is the principal serving a block?)
//!     → rate_limit.rs (sliding window per principal and action class)
//!     → sanitizer.rs (length, control characters, injection patterns)
//!     → session.rs (token exists, owned by caller, not expired)
//!     → Pass to business logic
//!
//! Sensitive payloads:
//!     → crypto.rs (AES-256-GCM seal/open)
//! ```
//!
//! # Design Decisions
//! - Each registry exclusively owns its maps; cross references are by id
//! - Per-key locking through DashMap shards
//! - Rate limiting fails open, every other check fails closed
//! - Policies hot-swapped through ArcSwap

pub mod block;
pub mod crypto;
pub mod rate_limit;
pub mod sanitizer;
pub mod session;

pub use block::{BlockRecord, BlockRegistry, BlockStatus};
pub use crypto::{CryptoError, PayloadCipher};
pub use rate_limit::{ActionClass, RateLimiter};
pub use sanitizer::{InputFinding, Sanitizer, SecurityCheck};
pub use session::{Session, SessionRegistry};
