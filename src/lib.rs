//! Crop Yield API
//!
//! Estimates the yield of a single agricultural field from monthly weather
//! statistics and Sentinel-2 vegetation indices, using a pretrained linear
//! model per district.

pub mod config;
pub mod errors;
mod helpers;
pub mod routes;
pub mod services;
