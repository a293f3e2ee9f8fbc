#![allow(non_snake_case)]
#![allow(non_upper_case_globals)]

pub mod config;
pub mod engine;
pub mod errors;
pub mod keys;
pub mod ticket;
pub mod utils;
