//! Plain data shared by every poolnode crate.
//!
//! Nothing in here talks to the network or the filesystem; the types describe what the
//! coordinator hands to a node (jobs) and what a node advertises back (metadata, filters, prices).

mod domain;
pub use domain::*;

mod runner;
pub use runner::*;
