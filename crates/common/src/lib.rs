//! Common utilities shared across ERP API components.

#![warn(clippy::pedantic)]

/// Module for JWT utilities (header inspection, time-window checks, constants)
pub mod jwt;
