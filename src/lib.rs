// Library for tests to access modules

pub mod aggregator;
pub mod auth;
pub mod config;
pub mod error;
pub mod exposition;
pub mod models;
pub mod monitoring;
pub mod rest;
pub mod routes;
pub mod version;
pub mod warehouse;
pub mod windows;
