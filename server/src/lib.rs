//! Evently Server - Hypermedia REST API for event listings.
//!
//! This crate provides the server component of Evently, responsible for:
//! - Creating, listing, reading and updating events
//! - Validating event input in a structural and a business stage
//! - Registering accounts and issuing bearer tokens
//! - Restricting event updates to the event's manager
//!
//! # Architecture
//!
//! Handlers in [`routes`] receive an [`auth::AuthContext`] per request,
//! validate input through [`validation`], persist through the
//! [`repository::EventRepository`] trait and answer with HAL documents built
//! by [`hal`]. All state is held in memory.

pub mod accounts;
pub mod auth;
pub mod config;
pub mod error;
pub mod hal;
pub mod paging;
pub mod password;
pub mod repository;
pub mod routes;
pub mod seed;
pub mod session;
pub mod types;
pub mod validation;
