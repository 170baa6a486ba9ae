// src/watch/mod.rs

//! Watch bookkeeping and event decoding.
//!
//! This module is responsible for:
//! - Decoding raw kernel records into [`decoder::RawEvent`]s.
//! - Keeping the handle/path bijection of active watches ([`WatchTable`]).
//! - Installing watches over whole trees in bounded batches.
//! - Pairing the two halves of a rename.
//!
//! It does **not** own the kernel handle or any task; the engine drives
//! these pieces.

pub mod correlator;
pub mod decoder;
pub mod event;
pub mod filter;
pub mod installer;
pub mod path_utils;
pub mod policy;
pub mod table;

pub use correlator::{MoveCorrelator, MoveFragment};
pub use decoder::{decode, RawEvent};
pub use event::WatchEvent;
pub use filter::{DefaultFilter, GlobFilter, WatchFilter};
pub use installer::{DrainStep, RecursiveInstaller};
pub use policy::WatchPolicy;
pub use table::{DetachedSubtree, InstallOutcome, WatchTable};
