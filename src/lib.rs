#![deny(warnings, clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub(crate) mod api;
pub mod app;
pub mod clients;
pub mod config;
pub mod janitor;
pub mod jobs;
pub mod observability;
pub mod pipeline;
pub mod ratelimit;
pub mod screening;
pub mod util;
