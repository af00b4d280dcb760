use crate::{
    api::{attendance, leave_request},
    auth::middleware::auth_middleware,
    config::Config,
    realtime::ws,
    store::RecordStore,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use tracing::warn;

// Helper to build per-route limiter
fn build_limiter(requests_per_min: u32) -> Option<Governor<PeerIpKeyExtractor, NoOpMiddleware>> {
    let per_ms = if requests_per_min == 0 {
        1
    } else {
        60_000 / requests_per_min as u64
    };
    let cfg = GovernorConfigBuilder::default()
        .per_millisecond(per_ms.max(1))
        .burst_size(requests_per_min.max(1))
        .key_extractor(PeerIpKeyExtractor)
        .finish()?;
    Some(Governor::new(&cfg))
}

pub fn configure<S: RecordStore>(cfg: &mut web::ServiceConfig, config: &Config) {
    // Public: the token travels as a query parameter
    cfg.service(web::resource("/realtime/ws").route(web::get().to(ws::realtime_ws)));

    let protected = web::scope(&config.api_prefix)
        .service(
            web::scope("/attendance")
                // /attendance/punch_in
                .service(
                    web::resource("/punch_in").route(web::post().to(attendance::punch_in::<S>)),
                )
                // /attendance/punch_out
                .service(
                    web::resource("/punch_out").route(web::post().to(attendance::punch_out::<S>)),
                )
                .service(web::resource("/today").route(web::get().to(attendance::today::<S>)))
                .service(web::resource("/summary").route(web::get().to(attendance::summary::<S>))),
        )
        .service(
            web::scope("/leave")
                // /leave
                .service(
                    web::resource("")
                        .route(web::get().to(leave_request::leave_list::<S>))
                        .route(web::post().to(leave_request::apply_leave::<S>)),
                )
                // /leave/my
                .service(web::resource("/my").route(web::get().to(leave_request::my_leaves::<S>)))
                // /leave/summary/{year}/{month}
                .service(
                    web::resource("/summary/{year}/{month}")
                        .route(web::get().to(leave_request::monthly_summary::<S>)),
                )
                // /leave/{id}
                .service(
                    web::resource("/{id}").route(web::get().to(leave_request::get_leave::<S>)),
                )
                // /leave/{id}/{action}
                .service(
                    web::resource("/{id}/{action}")
                        .route(web::put().to(leave_request::decide_leave::<S>)),
                ),
        );

    // Protected routes
    match build_limiter(config.rate_protected_per_min) {
        Some(limiter) => cfg.service(
            protected
                .wrap(from_fn(auth_middleware)) // authentication
                .wrap(limiter), // rate limiting
        ),
        None => {
            warn!(
                rate = config.rate_protected_per_min,
                "Invalid rate limit, protected routes are not rate limited"
            );
            cfg.service(protected.wrap(from_fn(auth_middleware)))
        }
    };
}
