//! Ressenti - backend for a written spiritual-consultation service
//!
//! A customer pays for a consultation through Stripe Checkout, submits their
//! question on the form, and the admin's written answer is delivered by
//! email. The heart of the crate is the paid → submitted → answered state
//! machine in [`consultation_service`]; everything around it is the web edge
//! and thin wrappers over the store, the payment provider and the mailer.

pub mod actions;
pub mod auth;
pub mod consultation_service;
pub mod consultations;
pub mod consultations_repo;
pub mod email;
pub mod metrics;
pub mod schema;
pub mod stripe_client;
pub mod web;
