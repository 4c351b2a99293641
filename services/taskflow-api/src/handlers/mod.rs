//! REST API handlers

pub mod decompose;
pub mod health;
pub mod payments;
pub mod shared;
pub mod subscription;
pub mod tasks;
pub mod webhook;

pub use decompose::*;
pub use health::*;
pub use payments::*;
pub use subscription::*;
pub use tasks::*;
pub use webhook::*;
