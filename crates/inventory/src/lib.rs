//! Inventory domain module.
//!
//! This crate contains the phone inventory model and the typed commands that
//! travel over the inventory channels, implemented purely as deterministic
//! domain logic (no IO, no HTTP, no storage).

pub mod action;
pub mod item;

pub use action::{
    ActionTag, DecodeError, DeleteCommand, InventoryCommand, MutateCommand, OrderBatch, OrderLine,
    QueryCommand, SkippedLine, WireCommand,
};
pub use item::{PhoneDraft, PhoneInventoryItem, PhoneModel, Price, RawPhoneDraft};
