pub mod bootstrap;
pub mod config;
pub mod google;
pub mod pdf;
pub mod security;
