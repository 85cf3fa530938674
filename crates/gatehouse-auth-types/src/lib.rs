//! Auth types shared between the identity service and whatever authorization
//! layer sits in front of it.
//!
//! Provides access-token claims and validation.

pub mod token;
