//! assetflow - front-end asset build pipeline
//!
//! This library provides functionality to:
//! - Compile, inline and minify stylesheets
//! - Concatenate, lint and minify scripts
//! - Optimize images through a content-addressed cache
//! - Run named tasks over a validated dependency graph
//! - Proxy a dev server with live reload while watching sources

pub mod build;
pub mod cache;
pub mod cli;
pub mod config;
pub mod lint;
pub mod optimize;
pub mod server;
pub mod sourcemap;
pub mod tasks;
pub mod tokenizer;
pub mod transforms;
pub mod watch;
