pub mod aprs_is;
pub mod config;
pub mod dispatcher;
pub mod logging;
pub mod scheduled;
pub mod stats;
pub mod traccar;
pub mod watchlist;
