pub mod cli;
pub mod topology;
