// src/handlers/bookings.rs
// DOCUMENTATION: Booking routes, staff only

use actix_web::web;

use crate::db::BookingRepository;
use crate::handlers::factory;
use crate::middleware::{Protect, RestrictTo};
use crate::models::Role;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/bookings")
            .route("", web::get().to(factory::get_all::<BookingRepository>))
            .route("", web::post().to(factory::create_one::<BookingRepository>))
            .route("/{id}", web::get().to(factory::get_one::<BookingRepository>))
            .route("/{id}", web::put().to(factory::update_one::<BookingRepository>))
            .route("/{id}", web::delete().to(factory::delete_one::<BookingRepository>))
            .wrap(RestrictTo::new(&[Role::Admin, Role::LeadGuide]))
            .wrap(Protect),
    );
}
