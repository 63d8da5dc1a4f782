//! Intermediate representation used by the splitter.
//!
//! A [`module::Module`] is a flat list of global variables and functions, each
//! carrying the linkage information required to link separately compiled
//! pieces back together. The crate provides:
//!
//! - the data model ([`module`], [`types`], [`value`], [`linkage`], [`name`]),
//! - a textual parser ([`parser`]) and printer ([`fmt`]) that round-trip,
//! - a structural verifier ([`verify`]) reporting problems as free text.
#![allow(clippy::manual_is_multiple_of)]

pub mod fmt;
pub mod linkage;
pub mod module;
pub mod name;
pub mod parser;
pub mod types;
pub mod utils;
pub mod value;
pub mod verify;
