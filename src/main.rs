use std::io;
use std::sync::Arc;

use actix_web::web;
use storefront_core::config::{Backend, Settings};
use storefront_core::infrastructure::change_feed::ChangeFeed;
use storefront_core::infrastructure::guest_cart::FileGuestCartStore;
use storefront_core::infrastructure::memory::MemoryStore;
use storefront_core::infrastructure::notifier::LogNotifier;
use storefront_core::infrastructure::outbox::OutboxRelay;
use storefront_core::{build_server, create_pool, run_migrations, AppState, Stores};

#[actix_web::main]
async fn main() -> io::Result<()> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let settings = Settings::from_env().map_err(|e| {
        log::error!("invalid configuration: {e}");
        io::Error::other(e)
    })?;

    let feed = ChangeFeed::new(settings.change_feed_capacity);
    let guest_carts = Arc::new(FileGuestCartStore::new(settings.guest_cart_dir.clone()));
    let notifier = Arc::new(LogNotifier);

    let stores = match &settings.backend {
        Backend::Postgres {
            database_url,
            pool_size,
        } => {
            let pool = create_pool(database_url, *pool_size).map_err(io::Error::other)?;
            run_migrations(&pool).map_err(io::Error::other)?;

            let relay = OutboxRelay::starting_at_head(pool.clone(), feed.clone())
                .map_err(io::Error::other)?;
            tokio::spawn(relay.run(settings.outbox_poll_interval));
            Stores::postgres(pool, guest_carts, notifier)
        }
        Backend::Memory => {
            log::warn!("using the in-memory store; data is lost on exit");
            Stores::memory(Arc::new(MemoryStore::new(feed.clone())), guest_carts, notifier)
        }
    };

    let state = AppState::new(stores, feed, settings.shipping.clone()).map_err(io::Error::other)?;
    state.follow_changes();

    log::info!("Starting server at http://{}:{}", settings.host, settings.port);

    build_server(web::Data::new(state), &settings.host, settings.port)?.await
}
