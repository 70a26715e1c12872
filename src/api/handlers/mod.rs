use rocket::Route;

pub mod records;
pub mod stats;
pub mod transform;

pub fn generate_transform_routes() -> Vec<Route> {
    routes![
        transform::encrypt_image,
        transform::decrypt_image,
        transform::encrypt_stego_image,
        transform::decrypt_stego_image
    ]
}

pub fn generate_record_routes() -> Vec<Route> {
    routes![
        records::list_images,
        records::delete_image,
        records::download_image,
        records::download_stego_image
    ]
}

pub fn generate_stats_routes() -> Vec<Route> {
    routes![stats::admin_stats, stats::metrics_all, stats::metrics_stats]
}
