//! Convert a Bundler lockfile into a content-addressed gemset for Nix builds.

pub mod cache;
pub mod cli;
pub mod closure;
pub mod config;
pub mod convert;
pub mod credentials;
pub mod download;
pub mod fetcher;
pub mod gemset;
pub mod lock;
pub mod model;
pub mod platform;
pub mod process;
pub mod ruby;
pub mod source;
