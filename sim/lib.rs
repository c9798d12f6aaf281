#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]
pub mod bootstrap;
pub mod calibration;
pub mod cohort;
pub mod config;
pub mod interval;
pub mod io;
pub mod pipeline;
pub mod progress;
pub mod report;
pub mod risk;
