pub mod config;
pub mod domain;
pub mod error;
pub mod logging;
pub mod middleware;
pub mod repository;
pub mod routes;
pub mod services;
pub mod state;
pub mod websocket;
pub mod workers;
