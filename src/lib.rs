#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::module_name_repetitions,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]

pub(crate) mod api;
pub mod app;
pub mod classifier;
pub mod config;
pub mod observability;
pub mod pipeline;
pub mod util;
