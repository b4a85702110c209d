use actix_session::storage::CookieSessionStore;
use actix_session::SessionMiddleware;
use actix_web::cookie::Key;
use actix_web::dev::Server;
use actix_web::{web, App, HttpServer};
use anyhow::Context;
use secrecy::{ExposeSecret, Secret};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::net::TcpListener;
use std::str::FromStr;
use std::sync::Arc;
use tracing_actix_web::TracingLogger;

use crate::auth::{compute_password_hash, RolePolicy};
use crate::config::{BootstrapAdmin, DatabaseSettings, Settings, StorageBackend};
use crate::models::{NewProduct, NewUser, NewUserRole, ProductCategory, Role};
use crate::routes::{
    auth_user, create_appointment, create_order, create_prescription, create_product, dashboard,
    delete_product, get_order, get_order_items, get_prescription, get_product, get_user_role,
    health_check, json_error_handler, list_appointments, list_orders, list_prescriptions,
    list_products, list_users, log_out, login, print_prescription, query_error_handler,
    set_user_role, update_appointment, update_product,
};
use crate::storage::{InMemoryStorage, PgStorage, Storage};

pub struct Application {
    port: u16,
    server: Server,
    storage: Arc<dyn Storage>,
}

impl Application {
    pub async fn build(config: Settings) -> Result<Self, anyhow::Error> {
        let storage: Arc<dyn Storage> = match config.storage {
            StorageBackend::Postgres => {
                let storage = PgStorage::new(get_connection_pool(&config.database));
                storage
                    .migrate()
                    .await
                    .context("Failed to run database migrations")?;
                Arc::new(storage)
            }
            StorageBackend::InMemory => Arc::new(InMemoryStorage::new()),
        };
        Self::build_with_storage(config, storage).await
    }

    pub async fn build_with_storage(
        config: Settings,
        storage: Arc<dyn Storage>,
    ) -> Result<Self, anyhow::Error> {
        if config.application.seed_demo_data {
            seed_demo_products(storage.as_ref()).await?;
        }
        if let Some(admin) = &config.bootstrap_admin {
            bootstrap_admin(admin, storage.as_ref()).await?;
        }

        let address = format!("{}:{}", config.application.host, config.application.port);
        let listener = TcpListener::bind(address)?;
        let port = listener.local_addr()?.port();
        let server = run(
            listener,
            storage.clone(),
            config.application.hmac_secret,
            ServerOptions {
                secure_cookies: config.application.secure_cookies,
                role_policy: RolePolicy {
                    enforce: config.application.enforce_roles,
                },
            },
        )?;

        Ok(Self {
            port,
            server,
            storage,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// The store the server is running against.
    pub fn storage(&self) -> Arc<dyn Storage> {
        self.storage.clone()
    }

    pub async fn run_until_stopped(self) -> Result<(), std::io::Error> {
        self.server.await
    }
}

pub fn get_connection_pool(config: &DatabaseSettings) -> PgPool {
    PgPoolOptions::new()
        .acquire_timeout(std::time::Duration::from_secs(2))
        .connect_lazy_with(config.with_db())
}

#[tracing::instrument(name = "Seeding demo products", skip(storage))]
async fn seed_demo_products(storage: &dyn Storage) -> Result<(), anyhow::Error> {
    if !storage.list_products(false).await?.is_empty() {
        return Ok(());
    }
    let demo = [
        (
            "Ray-Ban Aviator",
            "Classic aviator frame",
            ProductCategory::Frame,
            "Ray-Ban",
            "RB3025",
            "150000",
            10,
        ),
        (
            "Blue Light Blockers",
            "Lenses that filter blue light from screens",
            ProductCategory::Lens,
            "Zeiss",
            "BlueGuard",
            "45000",
            50,
        ),
        (
            "Contact Lens Solution",
            "Multipurpose solution, 360ml",
            ProductCategory::Accessory,
            "Renu",
            "MultiPlus",
            "8990",
            100,
        ),
    ];
    for (name, description, category, brand, model, price, stock) in demo {
        storage
            .create_product(NewProduct {
                name: name.into(),
                description: Some(description.into()),
                category,
                brand: Some(brand.into()),
                model: Some(model.into()),
                price: rust_decimal::Decimal::from_str(price)?,
                stock,
                image_url: None,
                active: true,
            })
            .await?;
    }
    tracing::info!("Seeded the catalog with demo products");
    Ok(())
}

#[tracing::instrument(name = "Bootstrapping the admin account", skip(admin, storage), fields(email = %admin.email))]
async fn bootstrap_admin(admin: &BootstrapAdmin, storage: &dyn Storage) -> Result<(), anyhow::Error> {
    let password = admin.password.clone();
    let password_hash = crate::telemetry::spawn_blocking_with_tracing(move || {
        compute_password_hash(password)
    })
    .await
    .context("Failed to spawn a blocking task")??;

    let id = match storage.get_stored_credentials(admin.email.clone()).await? {
        Some((id, _)) => id,
        None => uuid::Uuid::new_v4().to_string(),
    };
    storage
        .upsert_user(NewUser {
            id: id.clone(),
            email: Some(admin.email.clone()),
            first_name: None,
            last_name: None,
            profile_image_url: None,
            password_hash: Some(password_hash),
        })
        .await?;
    storage
        .set_user_role(NewUserRole::with_role(id, Role::Admin))
        .await?;
    Ok(())
}

pub struct ServerOptions {
    pub secure_cookies: bool,
    pub role_policy: RolePolicy,
}

pub fn run(
    listener: TcpListener,
    storage: Arc<dyn Storage>,
    hmac_secret: Secret<String>,
    options: ServerOptions,
) -> Result<Server, anyhow::Error> {
    let storage: web::Data<dyn Storage> = web::Data::from(storage);
    let role_policy = web::Data::new(options.role_policy);
    let secret_key = Key::try_from(hmac_secret.expose_secret().as_bytes())
        .context("The hmac secret must be at least 64 bytes long")?;
    let secure_cookies = options.secure_cookies;

    let server: Server = HttpServer::new(move || {
        App::new()
            .wrap(
                SessionMiddleware::builder(CookieSessionStore::default(), secret_key.clone())
                    .cookie_secure(secure_cookies)
                    .build(),
            )
            .wrap(TracingLogger::default())
            .app_data(web::JsonConfig::default().error_handler(json_error_handler))
            .app_data(web::QueryConfig::default().error_handler(query_error_handler))
            .route("/health_check", web::get().to(health_check))
            .service(
                web::scope("/api")
                    .route("/login", web::post().to(login))
                    .route("/logout", web::post().to(log_out))
                    .route("/auth/user", web::get().to(auth_user))
                    .route("/dashboard", web::get().to(dashboard))
                    .service(
                        web::resource("/products")
                            .route(web::get().to(list_products))
                            .route(web::post().to(create_product)),
                    )
                    .service(
                        web::resource("/products/{id}")
                            .route(web::get().to(get_product))
                            .route(web::put().to(update_product))
                            .route(web::delete().to(delete_product)),
                    )
                    .service(
                        web::resource("/appointments")
                            .route(web::get().to(list_appointments))
                            .route(web::post().to(create_appointment)),
                    )
                    .route("/appointments/{id}", web::put().to(update_appointment))
                    .service(
                        web::resource("/prescriptions")
                            .route(web::get().to(list_prescriptions))
                            .route(web::post().to(create_prescription)),
                    )
                    .route("/prescriptions/{id}", web::get().to(get_prescription))
                    .route(
                        "/prescriptions/{id}/print",
                        web::get().to(print_prescription),
                    )
                    .service(
                        web::resource("/orders")
                            .route(web::get().to(list_orders))
                            .route(web::post().to(create_order)),
                    )
                    .route("/orders/{id}", web::get().to(get_order))
                    .route("/orders/{id}/items", web::get().to(get_order_items))
                    .route("/users/role", web::post().to(set_user_role))
                    .route("/users/{id}/role", web::get().to(get_user_role))
                    .route("/admin/users", web::get().to(list_users)),
            )
            .app_data(storage.clone())
            .app_data(role_policy.clone())
    })
    .listen(listener)?
    .run();
    Ok(server)
}
