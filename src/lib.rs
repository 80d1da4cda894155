pub mod cascade;
pub mod compose;
pub mod config;
pub mod dynamics;
pub mod error;
pub mod intervention;
pub mod network;
pub mod numerics;
pub mod registry;
pub mod series;
pub mod state;
pub mod steady_state;
