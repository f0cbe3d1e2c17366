//! Shared utilities for end-to-end tests.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::mpsc;

use shop_resilience::config::ServiceConfig;
use shop_resilience::http::AppServer;
use shop_resilience::jobs::{MemoryQueue, QueueProducer};
use shop_resilience::lifecycle::{Services, Shutdown};
use shop_resilience::shop::{shop_router, Product, ShopState, SimulatedGateway};
use shop_resilience::store::MemoryStore;

pub const ADMIN_KEY: &str = "e2e-admin-key";

/// A running service on an ephemeral port, backed by in-process fakes.
#[allow(dead_code)]
pub struct TestApp {
    pub addr: SocketAddr,
    pub client: reqwest::Client,
    pub store: MemoryStore,
    pub queue: MemoryQueue,
    pub gateway: SimulatedGateway,
    pub services: Services,
    pub config_updates: mpsc::UnboundedSender<ServiceConfig>,
    pub shutdown: Shutdown,
}

#[allow(dead_code)]
impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn admin(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder.bearer_auth(ADMIN_KEY)
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Config with the admin API on and the queue enabled.
pub fn test_config() -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.queue.enabled = true;
    config.admin.enabled = true;
    config.admin.api_key = ADMIN_KEY.into();
    config
}

pub fn test_products() -> Vec<Product> {
    vec![
        Product::new("X1", "Trail battery pack", 4_999, 6),
        Product::new("X2", "Solar charger", 8_900, 40),
    ]
}

/// Start the full service on 127.0.0.1:0.
pub async fn spawn_app(config: ServiceConfig) -> TestApp {
    let store = MemoryStore::new();
    let queue = MemoryQueue::new();
    let gateway = SimulatedGateway::new();

    let producer: Arc<dyn QueueProducer> = Arc::new(queue.clone());
    let services = Services::assemble(&config, Arc::new(store.clone()), Some(producer));
    let shop = ShopState::new(&services, gateway.clone()).with_products(test_products());
    let server = AppServer::new(&config, services.clone(), shop_router(shop));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let (config_tx, config_rx) = mpsc::unbounded_channel();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, config_rx, server_shutdown).await;
    });

    let client = reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap();

    TestApp {
        addr,
        client,
        store,
        queue,
        gateway,
        services,
        config_updates: config_tx,
        shutdown,
    }
}
