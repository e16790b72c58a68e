//! orgkernel: the kernel and access control list of a modular organization.
//!
//! A namespaced registry maps `(namespace, app id)` to addresses. A
//! permission store answers "may entity E perform role R on module M with
//! these arguments", optionally under a predicate that reads call arguments,
//! chain facts and oracle modules. Modules are reached through proxies that
//! resolve their implementation from the registry on every call, so upgrades
//! never move storage.
//!
//! See `DESIGN.md` for the architecture notes.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod acl;
pub mod apps;
pub mod audit;
pub mod config;
pub mod error;
pub mod host;
pub mod kernel;
pub mod logging;
pub mod script;
pub mod store;
pub mod types;
