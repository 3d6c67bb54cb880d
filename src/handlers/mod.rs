pub mod commands;
pub mod input;
pub mod media;
pub mod responses;
