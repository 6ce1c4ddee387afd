//! `IDispatch` adapter for the live application (Windows only).
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`guard`] | `MtaGuard` keeping the process MTA alive for the session |
//! | [`object`] | `ComObject`: [`Dispatch`](crate::proxy::Dispatch) over `IDispatch::Invoke` |
//! | [`variant`] | [`Value`](crate::value::Value) <-> `VARIANT` conversion |
//! | [`sink`] | Connection-point event sink forwarding to an [`EventSink`](crate::event::EventSink) |

pub mod guard;
pub mod object;
pub mod sink;
pub mod variant;

pub use guard::MtaGuard;
pub use object::ComObject;

/// ProgID of the application's automation server.
pub const CANOE_PROGID: &str = "CANoe.Application";

/// `LOCALE_USER_DEFAULT`, passed to every name lookup and invoke.
pub(crate) const LOCALE_USER_DEFAULT: u32 = 0x0400;
