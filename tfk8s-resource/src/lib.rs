//! The tfk8s resource provider interface.
//!
//! A provider is an executable that speaks a line-delimited JSON protocol on
//! its standard input and output: one [`schema::v0::Request`] per line in,
//! one [`schema::v0::Response`] per line out. Providers implement
//! [`framework::ResourceProvider`] and hand it to [`framework::run_main`].

pub mod framework;
pub mod schema;
