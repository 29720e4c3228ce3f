//! Anemia screening service.
//!
//! An uploaded conjunctiva image is scored by two base image classifiers, the
//! two scores are stacked into a logistic meta model, and the resulting
//! probability is bucketed into a risk level with a fixed recommendation.

pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod routes;
pub mod state;
