mod api;
mod config;
mod data_io;
mod location;
mod logging;
mod poller;
mod runtime;
mod tui;
mod types;
mod ui_utils;

pub use runtime::run;
