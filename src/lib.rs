//! Pharmacy-signal outbreak monitoring: typed clients for the outbreak
//! backend and public data sources, and a polling cache that keeps every
//! dashboard resource fresh.

pub mod api;
pub mod app;
pub mod cache;
pub mod config;
pub mod event;
pub mod feed;
pub mod logging;
pub mod panels;
