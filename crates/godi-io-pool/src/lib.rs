#![deny(unsafe_code)]
#![deny(missing_docs)]

//! # Overview
//!
//! `godi-io-pool` provides the device-aware, bounded-parallel read and write
//! controllers the gather stage drives (§4.1, §4.2). One [`read::ReadPool`]
//! and one [`write::WritePool`] exist per physical device; [`device_map`]
//! builds those pools from a set of root trees.
//!
//! # Design
//!
//! Each [`read::ReadHandle`] runs a producer/consumer handshake with its
//! worker thread over two `std::sync::mpsc` channels: the consumer hands the
//! read buffer back through `ready`, the worker hands filled buffers back
//! through `result`. This is the two-channel pattern described in §9 of the
//! design, chosen over a single rendezvous channel so the buffer itself
//! round-trips with zero extra allocation.

pub mod cancel;
pub mod device_map;
pub mod read;
pub mod write;

pub use cancel::CancelToken;
pub use device_map::{ReadPoolMap, WritePoolMap};
pub use read::{ReadHandle, ReadPool};
pub use write::{WriteHandle, WritePool};
