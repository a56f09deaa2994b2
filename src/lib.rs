//! Resumable bulk acquisition of Vahan dashboard reports.
//!
//! Reports are addressed by a [`domain::UnitOfWork`], stored at a path derived
//! by [`store::ArtifactStore`], fetched by [`executor::FetchExecutor`] through a
//! [`channel::ReportSource`], and driven to completion by
//! [`coordinator::Coordinator`].

pub mod app;
pub mod channel;
pub mod config;
pub mod coordinator;
pub mod dashboard;
pub mod domain;
pub mod error;
pub mod executor;
pub mod manifest;
pub mod output;
pub mod scope;
pub mod store;
pub mod webdriver;
