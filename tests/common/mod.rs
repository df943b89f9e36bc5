#![allow(dead_code)]

pub mod fake_worker;
pub mod harness;
pub mod strategies;

pub use fake_worker::*;
pub use harness::*;
pub use strategies::*;
