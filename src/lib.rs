//! Registro de solicitudes - request approval workflow API.
//!
//! Users submit solicitudes, reviewers attach revisiones whose
//! recommendation moves the solicitud through its lifecycle, and reviewed
//! solicitudes can be downloaded as PDF. The HTTP surface lives in [`api`];
//! [`server`] wires storage, services and the router together.

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod lifecycle;
pub mod models;
pub mod policy;
pub mod server;
pub mod services;
pub mod validation;
