pub mod utils;

mod api;
mod stats;
