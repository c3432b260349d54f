//! Shared wire types for jumpgate instance coordination.
//!
//! This crate defines what cooperating processes of one application agree on:
//! the identifier each live instance registers under, the single frame an
//! instance endpoint accepts, and where the shared runtime files live. Frames
//! travel over Unix domain sockets with a little-endian length prefix and a
//! postcard body.

#![warn(missing_docs)]

pub mod codec;
pub mod paths;
pub mod types;

pub use codec::{CodecError, MAX_FRAME_LEN, read_frame, write_frame};
pub use paths::AppPaths;
pub use types::*;
