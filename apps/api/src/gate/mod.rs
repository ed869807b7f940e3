//! # Gates
//!
//! Everything a request passes before a service runs.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  request                                                                │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  Caller extractor ── token (Bearer / sgir_session cookie)               │
//! │     │                  └─► JWT valid? ─► session alive? ─► principal    │
//! │     ▼                                                     active?       │
//! │  caller.require(req) ── role ∈ req.roles, area held                     │
//! │     │                                                                   │
//! │     ▼  req.mutating ∧ role ∈ {waiter, cook}                             │
//! │  WorkDayGate ── any shift open today? (cached ≤ 60 s)                   │
//! │     │              └─ no ─► session revoked, shift_closed               │
//! │     ▼                                                                   │
//! │  service                                                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! PIN logins go through the [`rate_limit::PinRateLimiter`] first.

pub mod extract;
pub mod liveness;
pub mod rate_limit;
pub mod session;

pub use extract::{Caller, SourceAddr};
pub use liveness::{business_date, WorkDayGate};
pub use rate_limit::{Clock, PinRateLimiter, SystemClock};
pub use session::{Session, SessionStore};
