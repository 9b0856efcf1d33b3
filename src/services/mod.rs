pub mod earth_engine;
pub mod features;
pub mod geometry;
pub mod indices;
pub mod model;
pub mod month;
pub mod retry;
pub mod weather;
pub mod weather_api;
