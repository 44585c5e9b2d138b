pub mod application;
pub mod config;
pub mod db;
pub mod domain;
pub mod errors;
pub mod handlers;
pub mod identity;
pub mod infrastructure;
pub mod schema;

use std::sync::{Arc, Mutex};

use actix_web::{middleware::Logger, web, App, HttpServer};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use application::cart_service::CartAggregator;
use application::catalog_service::CatalogService;
use application::checkout::{CheckoutService, CheckoutSessions};
use application::order_service::OrderService;
use application::price_approval::{follow, PendingBoard, PriceApprovalWorkflow};
use application::wishlist_service::WishlistService;
use domain::errors::DomainError;
use domain::events::{ChangeEvent, ChangeFilter};
use domain::order::ShippingPolicy;
use domain::ports::{
    CartRepository, GuestCartStore, Notifier, OrderRepository, ProductRepository,
    WishlistRepository,
};
use domain::product::PendingProduct;
use handlers::{admin, cart, checkout, finance, orders, products, wishlist, ApiDoc};
use infrastructure::cart_repo::DieselCartRepository;
use infrastructure::change_feed::ChangeFeed;
use infrastructure::memory::MemoryStore;
use infrastructure::order_repo::DieselOrderRepository;
use infrastructure::product_repo::DieselProductRepository;
use infrastructure::wishlist_repo::DieselWishlistRepository;

pub use db::{create_pool, DbPool};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Run any pending Diesel migrations against the pool's database.
pub fn run_migrations(pool: &DbPool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut conn = pool.get()?;
    conn.run_pending_migrations(MIGRATIONS)?;
    Ok(())
}

/// The storage ports the services are wired against.
#[derive(Clone)]
pub struct Stores {
    pub products: Arc<dyn ProductRepository>,
    pub carts: Arc<dyn CartRepository>,
    pub guest_carts: Arc<dyn GuestCartStore>,
    pub orders: Arc<dyn OrderRepository>,
    pub wishlist: Arc<dyn WishlistRepository>,
    pub notifier: Arc<dyn Notifier>,
}

impl Stores {
    pub fn memory(
        store: Arc<MemoryStore>,
        guest_carts: Arc<dyn GuestCartStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            products: store.clone(),
            carts: store.clone(),
            orders: store.clone(),
            wishlist: store,
            guest_carts,
            notifier,
        }
    }

    pub fn postgres(
        pool: DbPool,
        guest_carts: Arc<dyn GuestCartStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            products: Arc::new(DieselProductRepository::new(pool.clone())),
            carts: Arc::new(DieselCartRepository::new(pool.clone())),
            orders: Arc::new(DieselOrderRepository::new(pool.clone())),
            wishlist: Arc::new(DieselWishlistRepository::new(pool)),
            guest_carts,
            notifier,
        }
    }
}

/// Everything the handlers reach through `web::Data`.
pub struct AppState {
    pub feed: ChangeFeed,
    pub catalog: CatalogService,
    pub cart: Arc<CartAggregator>,
    pub checkout: CheckoutService,
    pub checkouts: CheckoutSessions,
    pub approvals: PriceApprovalWorkflow,
    pub pending_board: Arc<Mutex<PendingBoard>>,
    pub orders: OrderService,
    pub wishlist: WishlistService,
}

impl AppState {
    /// Wires the services. Loads the finance board, so the store must be
    /// reachable.
    pub fn new(
        stores: Stores,
        feed: ChangeFeed,
        shipping: ShippingPolicy,
    ) -> Result<Self, DomainError> {
        let cart = Arc::new(CartAggregator::new(
            stores.carts.clone(),
            stores.guest_carts.clone(),
            stores.products.clone(),
            stores.notifier.clone(),
        ));
        let board = PendingBoard::load(stores.products.clone())?;

        Ok(Self {
            catalog: CatalogService::new(stores.products.clone(), stores.notifier.clone()),
            checkout: CheckoutService::new(
                cart.clone(),
                stores.orders.clone(),
                shipping,
                stores.notifier.clone(),
            ),
            checkouts: CheckoutSessions::new(),
            approvals: PriceApprovalWorkflow::new(
                stores.products.clone(),
                stores.notifier.clone(),
            ),
            pending_board: Arc::new(Mutex::new(board)),
            orders: OrderService::new(stores.orders.clone(), feed.clone(), stores.notifier.clone()),
            wishlist: WishlistService::new(
                stores.wishlist.clone(),
                stores.carts.clone(),
                stores.products.clone(),
                stores.notifier.clone(),
            ),
            cart,
            feed,
        })
    }

    /// Starts the task that keeps the finance board in step with product
    /// changes. Must be called from inside a Tokio runtime.
    pub fn follow_changes(&self) -> tokio::task::JoinHandle<()> {
        // Subscribe before the resync so nothing falls between the two.
        let subscription = self.feed.subscribe(ChangeFilter::Products);
        let board = self.pending_board.clone();
        tokio::spawn(async move {
            let resync_board = board.clone();
            let resynced = tokio::task::spawn_blocking(move || {
                resync_board
                    .lock()
                    .map_err(|_| DomainError::Transport("pending board lock poisoned".to_string()))?
                    .resync()
            })
            .await;
            match resynced {
                Ok(Ok(())) => {}
                Ok(Err(e)) => log::warn!("initial pending board resync failed: {e}"),
                Err(e) => log::warn!("initial pending board resync panicked: {e}"),
            }
            follow(board, subscription).await;
        })
    }

    /// Applies a change this process just made, without waiting for the feed.
    pub fn reconcile_pending(&self, event: &ChangeEvent) -> Result<(), DomainError> {
        self.pending_board
            .lock()
            .map_err(|_| DomainError::Transport("pending board lock poisoned".to_string()))?
            .apply(event)
            .map(|_| ())
    }

    pub fn pending_entries(&self) -> Result<Vec<PendingProduct>, DomainError> {
        Ok(self
            .pending_board
            .lock()
            .map_err(|_| DomainError::Transport("pending board lock poisoned".to_string()))?
            .entries()
            .to_vec())
    }
}

/// Registers every API route. Shared by the server and the tests.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/products")
            .route("", web::get().to(products::list_products))
            .route("/{id}", web::get().to(products::get_product)),
    )
    .route("/supplier/products", web::post().to(products::submit_product))
    .service(
        web::scope("/cart")
            .route("", web::get().to(cart::get_cart))
            .route("", web::delete().to(cart::clear_cart))
            .route("/items", web::post().to(cart::add_item))
            .route("/items/{product_id}", web::put().to(cart::set_quantity))
            .route("/items/{product_id}", web::delete().to(cart::remove_item))
            .route("/merge", web::post().to(cart::merge_guest_cart)),
    )
    .service(
        web::scope("/checkout")
            .route("", web::post().to(checkout::start_checkout))
            .route("", web::get().to(checkout::get_checkout))
            .route("", web::delete().to(checkout::cancel_checkout))
            .route("/address", web::put().to(checkout::submit_address))
            .route("/payment", web::put().to(checkout::choose_payment))
            .route("/back", web::post().to(checkout::go_back))
            .route("/commit", web::post().to(checkout::commit_checkout)),
    )
    .service(
        web::scope("/orders")
            .route("", web::get().to(orders::list_my_orders))
            .route("/changes", web::get().to(orders::watch_my_orders))
            .route("/{id}", web::get().to(orders::get_order))
            .route("/{id}/cancel", web::post().to(orders::cancel_order)),
    )
    .service(
        web::scope("/wishlist")
            .route("", web::get().to(wishlist::list_wishlist))
            .route("", web::post().to(wishlist::add_to_wishlist))
            .route("/{product_id}", web::delete().to(wishlist::remove_from_wishlist))
            .route("/{product_id}/move-to-cart", web::post().to(wishlist::move_to_cart)),
    )
    .service(
        web::scope("/finance")
            .route("/pending", web::get().to(finance::list_pending))
            .route("/products/{id}/margin", web::get().to(finance::preview_margin))
            .route("/products/{id}/approve", web::post().to(finance::approve_product)),
    )
    .service(
        web::scope("/admin")
            .route("/orders", web::get().to(admin::list_orders))
            .route("/orders/{id}/status", web::put().to(admin::update_order_status))
            .route("/products/pending", web::get().to(admin::list_pending_review))
            .route("/products/{id}/review", web::post().to(admin::review_product))
            .route("/products/{id}", web::delete().to(admin::delete_product)),
    );
}

/// Build and return an actix-web `Server` bound to `host:port`.
///
/// The caller is responsible for `.await`-ing (or `tokio::spawn`-ing) the
/// returned server.
pub fn build_server(
    state: web::Data<AppState>,
    host: &str,
    port: u16,
) -> std::io::Result<actix_web::dev::Server> {
    let openapi = ApiDoc::openapi();
    Ok(HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(Logger::default())
            .configure(configure)
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", openapi.clone()),
            )
    })
    .bind((host.to_string(), port))?
    .run())
}
