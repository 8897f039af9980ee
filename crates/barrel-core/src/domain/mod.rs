//! Domain entities for grog barrel.
//!
//! This module contains pure business logic with no infrastructure dependencies.
//!
//! # What is "domain" in Clean Architecture? (for beginners)
//!
//! Clean Architecture organises code into concentric layers.  The innermost
//! layer is called the **domain**.  Domain code has **no** imports from
//! sockets, runtimes, or the filesystem, so it can be tested on any platform
//! without setup.  Here the domain is small: a connected client, identified
//! by its slot inside a room.

/// Connected client identity and slot numbering.
pub mod client;
