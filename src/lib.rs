//! Cleaning marketplace backend
//!
//! Landlords book cleaning jobs, cleaners request and fulfil them, and the
//! job lifecycle keeps job, payment and payout status consistent with the
//! payment processor.

pub mod api;
pub mod app;
pub mod auth;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod gateway;
pub mod lifecycle;
pub mod logging;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod store;
pub mod sweep;
