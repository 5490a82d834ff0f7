// src/lib.rs — Library root for Spaceport

pub mod cli;
pub mod dispatch;
pub mod features;
pub mod infra;
pub mod plugins;
pub mod server;
pub mod space;

pub use server::{Server, ServerBuilder};
