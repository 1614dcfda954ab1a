//! Tessel - chunked tile placement and instanced-rendering engine

pub mod core;
pub mod math;
pub mod tile;
pub mod storage;
pub mod render;
pub mod edit;
pub mod persist;
