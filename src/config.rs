pub mod run;
pub mod setup;
