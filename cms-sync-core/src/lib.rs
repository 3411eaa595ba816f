#![doc = "cms-sync-core: reconciliation engine for cms-sync."]

//! This crate holds all of the snapshot and convergence logic for cms-sync: identity
//! resolution, attribute diffing, hierarchy-aware ordering of folders and matrix-shaped
//! reconciliation of permissions. It knows nothing about HTTP; a transport plugs in through
//! [`contract::ResourceAdapter`].
//!
//! # Usage
//! Build an adapter, parse snapshots into [`synchronise::KindSnapshot`]s and hand them to
//! [`synchronise::apply_snapshots`].

pub mod contract;
pub mod diff;
pub mod error;
pub mod folders;
pub mod identity;
pub mod paginate;
pub mod permissions;
pub mod report;
pub mod schema;
pub mod synchronise;
pub mod translations;
