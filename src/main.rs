use anyhow::Context;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use food_orders::cache::{CacheStore, MemoryCache, OrderCache, ProductCache, PromoCodeCache, RedisCache};
use food_orders::config::Config;
use food_orders::metrics::{self, Metrics};
use food_orders::models::{OrderLine, OrderRequest, Product};
use food_orders::promo::{FileSource, PromoSource, PromoValidator};
use food_orders::repository::{OrderRepository, ProductRepository};
use food_orders::services::OrderService;
use food_orders::store::{MemoryStore, OrderStore, PgStore, ProductStore};
use food_orders::utils::Deadline;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Default to INFO, overridable with RUST_LOG
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,food_orders=debug")),
        )
        .init();

    tracing::info!("🚀 Starting food order service demo");

    let config = Config::from_env().context("failed to load configuration")?;

    // === 1. Metrics ===
    let metrics = Arc::new(Metrics::new()?);
    tracing::info!("📊 Metrics registry created with {} metrics", metrics.registry().gather().len());

    if config.metrics_port != 0 {
        let registry = metrics.registry().clone();
        let port = config.metrics_port;
        std::thread::spawn(move || {
            let result = actix_web::rt::System::new()
                .block_on(metrics::start_metrics_server(registry, port));
            if let Err(e) = result {
                tracing::error!("Metrics server error: {}", e);
            }
        });
    }

    // === 2. Persistent store ===
    let product_store: Arc<dyn ProductStore>;
    let order_store: Arc<dyn OrderStore>;
    let mut pg = None;

    match &config.database_url {
        Some(url) => {
            let store = PgStore::connect(url, config.db_max_connections, config.operation_timeout)
                .await
                .context("failed to connect to PostgreSQL")?;
            store.ensure_schema().await?;
            product_store = Arc::new(store.clone());
            order_store = Arc::new(store.clone());
            pg = Some(store);
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store with demo catalog");
            let store = MemoryStore::with_products(demo_catalog());
            product_store = Arc::new(store.clone());
            order_store = Arc::new(store);
        }
    }

    // === 3. Cache ===
    let cache: Arc<dyn CacheStore> = match &config.redis_url {
        Some(url) => match RedisCache::connect(url, config.cache_timeout, metrics.clone()).await {
            Ok(redis) => Arc::new(redis),
            Err(e) => {
                tracing::warn!(error = %e, "Redis unavailable, falling back to in-process cache");
                Arc::new(MemoryCache::new())
            }
        },
        None => Arc::new(MemoryCache::new()),
    };

    // === 4. Wire the service ===
    let deadline = Deadline::new(config.operation_timeout);

    let products = ProductRepository::new(
        product_store,
        ProductCache::new(cache.clone(), config.catalog_cache_ttl, metrics.clone()),
        deadline,
    );
    let orders = OrderRepository::new(
        order_store,
        OrderCache::new(cache.clone(), config.order_cache_ttl, metrics.clone()),
        deadline,
        metrics.clone(),
    );

    let sources: Vec<Arc<dyn PromoSource>> = config
        .coupon_paths()
        .into_iter()
        .map(|path| Arc::new(FileSource::new(path)) as Arc<dyn PromoSource>)
        .collect();
    let promo = PromoValidator::new(
        sources,
        config.promo_quorum,
        PromoCodeCache::new(cache, config.promo_cache_ttl, metrics.clone()),
        deadline,
        metrics.clone(),
    )?;

    let service = OrderService::new(products, orders, promo);

    // === 5. Demonstrate the order lifecycle ===
    let catalog = service.list_products().await?;
    tracing::info!("🍕 Catalog has {} products", catalog.len());

    let lines: Vec<OrderLine> = catalog
        .iter()
        .take(2)
        .enumerate()
        .map(|(i, product)| OrderLine::new(product.id, i as i32 + 1))
        .collect();

    if lines.is_empty() {
        tracing::warn!("Catalog is empty, skipping order placement");
    } else {
        let request = OrderRequest::new(None, lines);
        match service.place_order(&request).await {
            Ok(order) => {
                tracing::info!("✅ Order {} placed, total {}", order.id, order.final_price);
                let fetched = service.get_order(order.id).await?;
                tracing::info!("📦 Order {} has {} items", fetched.id, fetched.items.len());
            }
            Err(e) => tracing::error!(
                status = e.status_code(),
                "❌ Placement failed: {}",
                e.public_message()
            ),
        }
    }

    let all_orders = service.list_orders().await?;
    tracing::info!("📋 {} orders on record", all_orders.len());

    match service.validate_promo("PROMO1234").await {
        Ok(valid) => tracing::info!("🎟️ Promo PROMO1234 valid: {}", valid),
        Err(e) => tracing::warn!("Promo validation unavailable: {}", e),
    }

    if let Some(store) = pg {
        store.close().await;
    }

    tracing::info!("🎉 Demo complete!");
    Ok(())
}

fn demo_catalog() -> Vec<Product> {
    [
        (1, "Margherita Pizza", 1099, "Pizza"),
        (2, "Caesar Salad", 749, "Salads"),
        (3, "Chicken Ramen", 1250, "Noodles"),
        (4, "Tiramisu", 550, "Desserts"),
    ]
    .into_iter()
    .map(|(id, name, cents, category)| Product {
        id,
        name: name.to_string(),
        price: Decimal::new(cents, 2),
        category: category.to_string(),
    })
    .collect()
}
