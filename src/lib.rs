//! # class-lens
//!
//! Decompiles Java class files, loose on disk or inside jars, with one of several pluggable
//! decompiler engines, and can realign the output so each statement sits on its original
//! source line.
//!
//! ## Architecture
//!
//! - **location**: Where a class file lives: a plain file or an archive member
//! - **resolver**: Bytecode lookup for the target class and its dependencies
//! - **naming**: Internal class name derivation from a location
//! - **engine**: Adapters for CFR, JD-Core, Procyon and Vineflower over their native interfaces
//! - **java**: Out-of-process back ends running each engine's jar
//! - **realign**: Line mappings and the realignment pass
//! - **prefs**: Preference storage using heed (LMDB)
//! - **registry**: Registered engines, engine selection and the realign preference
//! - **decompiler**: The facade turning a location into displayable text
//! - **document**: Read-only view over decompiled text
//! - **error**: Error taxonomy shared by the library

pub mod cli;
pub mod config;
pub mod decompiler;
pub mod document;
pub mod engine;
pub mod error;
pub mod java;
pub mod location;
pub mod naming;
pub mod prefs;
pub mod realign;
pub mod registry;
pub mod resolver;
