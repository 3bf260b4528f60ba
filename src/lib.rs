pub mod config;
pub mod controller;
pub mod link;
pub mod messages;
pub mod policy;
