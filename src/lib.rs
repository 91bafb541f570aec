pub mod catalog;
pub mod config;
pub mod domain;
pub mod error;
pub mod fetcher;
pub mod fs_util;
pub mod inventory;
pub mod organizer;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod queue;
pub mod transport;
