//! `canoe_core` -- Rust binding for the CANoe COM automation interface.
//!
//! This crate contains all binding logic with **no PyO3 dependency**.
//! It can be consumed directly from Rust or through `canoe-pyo3` (the
//! `canoe_native` Python extension).
//!
//! Wrappers are written against the [`proxy::Dispatch`] capability
//! interface, so everything above [`com`] runs (and is tested) on any
//! platform with [`mock`] standing in for the remote application.
//!
//! # Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`errors`] | `CanoeError` taxonomy via `thiserror` |
//! | [`value`] | `Value` exchanged with the remote interface, native conversions |
//! | [`proxy`] | `Handle` wrapper base, `Dispatch` capability trait, declaration macros |
//! | [`collection`] | 1-based remote collections exposed 0-based |
//! | [`event`] | Event sinks: `ValueSink` mailbox, `EventLatch` lifecycle flags |
//! | [`logging`] | Console + rotating file logging via `tracing-appender` |
//! | [`objects`] | Typed wrappers for every automation entity |
//! | [`session`] | `Canoe` scripting session: open, measure, variables, diagnostics, CAPL |
//! | `com` | `IDispatch` adapter, variant conversion, connection-point sinks (Windows only) |
//! | `mock` | In-memory `Dispatch` test double (tests / `test-support` feature) |

#[macro_use]
pub mod proxy;

pub mod collection;
pub mod errors;
pub mod event;
pub mod logging;
pub mod objects;
pub mod session;
pub mod value;

#[cfg(windows)]
pub mod com;

#[cfg(any(test, feature = "test-support"))]
pub mod mock;

pub use errors::{CanoeError, Result};
pub use session::{Canoe, OpenOptions, SessionOptions};
pub use value::Value;
