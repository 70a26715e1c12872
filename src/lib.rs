#[macro_use]
extern crate rocket;

pub mod api;
pub mod capability;
pub mod common;
pub mod config;
pub mod database;
pub mod pipeline;
pub mod utils;

use rocket::figment::Figment;
use rocket::{Build, Rocket};

use crate::api::handlers::{
    generate_record_routes, generate_stats_routes, generate_transform_routes,
};
use crate::pipeline::Pipeline;

pub fn build_rocket(figment: Figment, pipeline: Pipeline) -> Rocket<Build> {
    rocket::custom(figment)
        .manage(pipeline)
        .mount("/api", generate_transform_routes())
        .mount("/api", generate_record_routes())
        .mount("/api", generate_stats_routes())
}
