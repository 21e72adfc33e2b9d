//! Route table for the `/api/v1/transactions` surface (§6).

use actix_web::web;
use blockscout_service_launcher::launcher::HttpRouter;

use crate::handlers;

#[derive(Clone)]
pub struct Router;

impl HttpRouter for Router {
    fn register_routes(&self, service_config: &mut web::ServiceConfig) {
        service_config.service(
            web::scope("/api/v1/transactions")
                .route("/upload", web::post().to(handlers::upload))
                .route("", web::delete().to(handlers::clear_transactions))
                .route("/uploads", web::get().to(handlers::list_uploads))
                .route(
                    "/uploads/incomplete",
                    web::get().to(handlers::list_incomplete_uploads),
                )
                .route(
                    "/uploads/resume-all",
                    web::post().to(handlers::resume_all),
                )
                .route("/uploads/{upload_id}", web::get().to(handlers::get_upload))
                .route(
                    "/uploads/{upload_id}/resume",
                    web::post().to(handlers::resume_one),
                ),
        );
    }
}
