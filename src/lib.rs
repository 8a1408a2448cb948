#![forbid(unsafe_code)]

pub mod acl;
pub mod api;
pub mod app;
pub mod auth;
pub mod config;
pub mod error;
pub mod guard;
pub mod observability;
pub mod registry;
pub mod route;
pub mod runtime;
pub mod storage;
