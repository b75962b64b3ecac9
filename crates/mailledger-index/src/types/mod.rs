//! Core index types.
//!
//! This module defines the identifiers, flags and range sets shared by the
//! transaction log, the index map and the sync engine.

#![allow(clippy::missing_const_for_fn)]

mod flags;
mod identifiers;
mod range;

pub use flags::{Flag, MailFlags};
pub use identifiers::{LogPosition, ModSeq, SeqNum, Uid, UidValidity};
pub use range::{IdRange, RangeSet};
