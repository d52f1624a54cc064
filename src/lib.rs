pub mod alerting;
pub mod checks;
pub mod config;
pub mod db;
pub mod model;
pub mod notifications;
pub mod remote;
pub mod server;
pub mod web;
