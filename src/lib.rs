pub mod bus;
pub mod calibration;
pub mod cli;
pub mod config;
pub mod drivers;
pub mod engine;
