//! Core-facing API boundary for the monocart shell.
//!
//! The embedded emulation core is an external collaborator: it loads a
//! core binary and a ROM, renders frames, and exposes opaque
//! serialize/unserialize entry points. This crate defines the seam the
//! shell talks through ([`CoreView`] and [`CoreFactory`]) along with
//! the event and fault types the core reports back, so the session
//! coordinator never depends on a concrete core implementation.

pub mod core;
pub mod variables;

pub use crate::core::{
    ByteSource, CoreError, CoreEvent, CoreFactory, CoreFault, CoreView, CoreViewData, KeyAction,
    MotionSource,
};
pub use crate::variables::{Variable, parse_variables};
