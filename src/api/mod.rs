// HTTP layer: handlers, request models and the router

pub mod handlers;
pub mod models;
pub mod routes;
