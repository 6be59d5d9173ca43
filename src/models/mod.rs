//! Core data models

pub mod events;
pub mod indicator;
pub mod strategy;
