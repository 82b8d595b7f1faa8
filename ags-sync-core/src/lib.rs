#![doc = "ags-sync-core: core logic library for ags-sync."]

//! This crate holds the reconciliation logic, the per-document artifact state
//! machine and the collaborator traits for ags-sync. Transport code (REST
//! client, toolchain process) lives in the CLI crate.
//!
//! # Usage
//! Build a [`config::SyncConfig`], provide a [`contract::Toolchain`] and a
//! [`contract::ServiceDirectory`], and call [`synchronise::synchronise`].

pub mod analysis;
pub mod artifacts;
pub mod config;
pub mod contract;
pub mod directory;
pub mod document;
pub mod error;
pub mod finder;
pub mod history;
pub mod sanitize;
pub mod server;
pub mod synchronise;
