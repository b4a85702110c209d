use futures::future::BoxFuture;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, Secret};
use sqlx::{PgPool, Row};

use super::{traced, Storage, StorageError, StorageResult};
use crate::models::{
    Appointment, AppointmentUpdate, NewAppointment, NewOrder, NewPrescription, NewProduct,
    NewUser, NewUserRole, Order, OrderItemWithProduct, OrderLine, Prescription, Product,
    ProductUpdate, User, UserRole, UserWithRole,
};

const PRODUCT_COLUMNS: &str =
    "id, name, description, category, brand, model, price, stock, image_url, active, created_at";
const APPOINTMENT_COLUMNS: &str =
    "id, patient_id, doctor_name, date, reason, status, notes, created_at";
const ORDER_COLUMNS: &str = "id, patient_id, prescription_id, date, status, total_amount, \
    deposit_amount, notes, created_at";
const USER_COLUMNS: &str = "id, email, first_name, last_name, profile_image_url, created_at";
const USER_ROLE_COLUMNS: &str = "id, user_id, role, rut, phone, address, birth_date";

const FOREIGN_KEY_VIOLATION: &str = "23503";
const UNIQUE_VIOLATION: &str = "23505";

pub struct PgStorage {
    pool: PgPool,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

/// Name of the violated constraint when `e` carries the given SQLSTATE.
fn is_violation(e: &sqlx::Error, code: &str) -> Option<String> {
    let db = e.as_database_error()?;
    if db.code().as_deref() == Some(code) {
        Some(db.constraint().unwrap_or_default().to_string())
    } else {
        None
    }
}

/// Maps a failed insert to the field whose reference could not be resolved.
fn insert_error(e: sqlx::Error) -> StorageError {
    match is_violation(&e, FOREIGN_KEY_VIOLATION) {
        Some(constraint) if constraint.contains("prescription_id") => {
            StorageError::MissingReference("prescriptionId")
        }
        Some(constraint) if constraint.contains("product_id") => {
            StorageError::MissingReference("productId")
        }
        Some(constraint) if constraint.contains("user_id") => {
            StorageError::MissingReference("userId")
        }
        Some(_) => StorageError::MissingReference("patientId"),
        None => StorageError::Database(e),
    }
}

impl Storage for PgStorage {
    fn list_products(&self, active_only: bool) -> BoxFuture<'_, StorageResult<Vec<Product>>> {
        traced("list_products", async move {
            let products = sqlx::query_as::<_, Product>(&format!(
                "SELECT {PRODUCT_COLUMNS} FROM products WHERE ($1 = FALSE OR active) ORDER BY id"
            ))
            .bind(active_only)
            .fetch_all(&self.pool)
            .await?;
            Ok(products)
        })
    }

    fn get_product(&self, id: i32) -> BoxFuture<'_, StorageResult<Option<Product>>> {
        traced("get_product", async move {
            let product = sqlx::query_as::<_, Product>(&format!(
                "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
            ))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(product)
        })
    }

    fn create_product(&self, product: NewProduct) -> BoxFuture<'_, StorageResult<Product>> {
        traced("create_product", async move {
            let created = sqlx::query_as::<_, Product>(&format!(
                r#"
                INSERT INTO products (name, description, category, brand, model, price, stock, image_url, active)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                RETURNING {PRODUCT_COLUMNS}
                "#
            ))
            .bind(&product.name)
            .bind(&product.description)
            .bind(product.category.as_str())
            .bind(&product.brand)
            .bind(&product.model)
            .bind(product.price)
            .bind(product.stock)
            .bind(&product.image_url)
            .bind(product.active)
            .fetch_one(&self.pool)
            .await?;
            Ok(created)
        })
    }

    fn update_product(
        &self,
        id: i32,
        update: ProductUpdate,
    ) -> BoxFuture<'_, StorageResult<Option<Product>>> {
        traced("update_product", async move {
            let updated = sqlx::query_as::<_, Product>(&format!(
                r#"
                UPDATE products
                SET name = COALESCE($2, name),
                    description = COALESCE($3, description),
                    category = COALESCE($4, category),
                    brand = COALESCE($5, brand),
                    model = COALESCE($6, model),
                    price = COALESCE($7, price),
                    stock = COALESCE($8, stock),
                    image_url = COALESCE($9, image_url),
                    active = COALESCE($10, active)
                WHERE id = $1
                RETURNING {PRODUCT_COLUMNS}
                "#
            ))
            .bind(id)
            .bind(&update.name)
            .bind(&update.description)
            .bind(update.category.map(|c| c.as_str()))
            .bind(&update.brand)
            .bind(&update.model)
            .bind(update.price)
            .bind(update.stock)
            .bind(&update.image_url)
            .bind(update.active)
            .fetch_optional(&self.pool)
            .await?;
            Ok(updated)
        })
    }

    fn delete_product(&self, id: i32) -> BoxFuture<'_, StorageResult<bool>> {
        traced("delete_product", async move {
            let result = sqlx::query("DELETE FROM products WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(|e| match is_violation(&e, FOREIGN_KEY_VIOLATION) {
                    Some(_) => StorageError::Conflict(format!(
                        "Product {id} is referenced by existing order items"
                    )),
                    None => StorageError::Database(e),
                })?;
            Ok(result.rows_affected() > 0)
        })
    }

    fn list_appointments(
        &self,
        patient_id: Option<String>,
    ) -> BoxFuture<'_, StorageResult<Vec<Appointment>>> {
        traced("list_appointments", async move {
            let appointments = sqlx::query_as::<_, Appointment>(&format!(
                r#"
                SELECT {APPOINTMENT_COLUMNS} FROM appointments
                WHERE ($1::TEXT IS NULL OR patient_id = $1)
                ORDER BY date DESC
                "#
            ))
            .bind(patient_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(appointments)
        })
    }

    fn get_appointment(&self, id: i32) -> BoxFuture<'_, StorageResult<Option<Appointment>>> {
        traced("get_appointment", async move {
            let appointment = sqlx::query_as::<_, Appointment>(&format!(
                "SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE id = $1"
            ))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(appointment)
        })
    }

    fn create_appointment(
        &self,
        appointment: NewAppointment,
    ) -> BoxFuture<'_, StorageResult<Appointment>> {
        traced("create_appointment", async move {
            let created = sqlx::query_as::<_, Appointment>(&format!(
                r#"
                INSERT INTO appointments (patient_id, doctor_name, date, reason, status, notes)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING {APPOINTMENT_COLUMNS}
                "#
            ))
            .bind(&appointment.patient_id)
            .bind(&appointment.doctor_name)
            .bind(appointment.date)
            .bind(&appointment.reason)
            .bind(appointment.status.as_str())
            .bind(&appointment.notes)
            .fetch_one(&self.pool)
            .await
            .map_err(insert_error)?;
            Ok(created)
        })
    }

    fn update_appointment(
        &self,
        id: i32,
        update: AppointmentUpdate,
    ) -> BoxFuture<'_, StorageResult<Option<Appointment>>> {
        traced("update_appointment", async move {
            let updated = sqlx::query_as::<_, Appointment>(&format!(
                r#"
                UPDATE appointments
                SET doctor_name = COALESCE($2, doctor_name),
                    date = COALESCE($3, date),
                    reason = COALESCE($4, reason),
                    status = COALESCE($5, status),
                    notes = COALESCE($6, notes)
                WHERE id = $1
                RETURNING {APPOINTMENT_COLUMNS}
                "#
            ))
            .bind(id)
            .bind(&update.doctor_name)
            .bind(update.date)
            .bind(&update.reason)
            .bind(update.status.map(|s| s.as_str()))
            .bind(&update.notes)
            .fetch_optional(&self.pool)
            .await?;
            Ok(updated)
        })
    }

    fn list_prescriptions(
        &self,
        patient_id: Option<String>,
    ) -> BoxFuture<'_, StorageResult<Vec<Prescription>>> {
        traced("list_prescriptions", async move {
            let prescriptions = sqlx::query_as::<_, Prescription>(
                r#"
                SELECT * FROM prescriptions
                WHERE ($1::TEXT IS NULL OR patient_id = $1)
                ORDER BY date DESC
                "#,
            )
            .bind(patient_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(prescriptions)
        })
    }

    fn get_prescription(&self, id: i32) -> BoxFuture<'_, StorageResult<Option<Prescription>>> {
        traced("get_prescription", async move {
            let prescription =
                sqlx::query_as::<_, Prescription>("SELECT * FROM prescriptions WHERE id = $1")
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await?;
            Ok(prescription)
        })
    }

    fn create_prescription(
        &self,
        prescription: NewPrescription,
    ) -> BoxFuture<'_, StorageResult<Prescription>> {
        traced("create_prescription", async move {
            let (od, os) = (&prescription.right_eye, &prescription.left_eye);
            let created = sqlx::query_as::<_, Prescription>(
                r#"
                INSERT INTO prescriptions (
                    patient_id, date, doctor_name,
                    sphere_od_far, cylinder_od_far, axis_od_far,
                    sphere_od_near, cylinder_od_near, axis_od_near,
                    sphere_os_far, cylinder_os_far, axis_os_far,
                    sphere_os_near, cylinder_os_near, axis_os_near,
                    addition, pupillary_distance, diagnosis, notes,
                    is_transcription, original_image_url
                )
                VALUES (
                    $1, COALESCE($2, now()), $3,
                    $4, $5, $6, $7, $8, $9,
                    $10, $11, $12, $13, $14, $15,
                    $16, $17, $18, $19, $20, $21
                )
                RETURNING *
                "#,
            )
            .bind(&prescription.patient_id)
            .bind(prescription.date)
            .bind(&prescription.doctor_name)
            .bind(&od.far.sphere)
            .bind(&od.far.cylinder)
            .bind(&od.far.axis)
            .bind(&od.near.sphere)
            .bind(&od.near.cylinder)
            .bind(&od.near.axis)
            .bind(&os.far.sphere)
            .bind(&os.far.cylinder)
            .bind(&os.far.axis)
            .bind(&os.near.sphere)
            .bind(&os.near.cylinder)
            .bind(&os.near.axis)
            .bind(&prescription.addition)
            .bind(&prescription.pupillary_distance)
            .bind(&prescription.diagnosis)
            .bind(&prescription.notes)
            .bind(prescription.is_transcription)
            .bind(&prescription.original_image_url)
            .fetch_one(&self.pool)
            .await
            .map_err(insert_error)?;
            Ok(created)
        })
    }

    fn list_orders(&self, patient_id: Option<String>) -> BoxFuture<'_, StorageResult<Vec<Order>>> {
        traced("list_orders", async move {
            let orders = sqlx::query_as::<_, Order>(&format!(
                r#"
                SELECT {ORDER_COLUMNS} FROM orders
                WHERE ($1::TEXT IS NULL OR patient_id = $1)
                ORDER BY date DESC
                "#
            ))
            .bind(patient_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(orders)
        })
    }

    fn get_order(&self, id: i32) -> BoxFuture<'_, StorageResult<Option<Order>>> {
        traced("get_order", async move {
            let order = sqlx::query_as::<_, Order>(&format!(
                "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"
            ))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(order)
        })
    }

    fn create_order(
        &self,
        order: NewOrder,
        lines: Vec<OrderLine>,
    ) -> BoxFuture<'_, StorageResult<Order>> {
        traced("create_order", async move {
            // Dropping `tx` before commit rolls everything back.
            let mut tx = self.pool.begin().await?;

            let created = sqlx::query_as::<_, Order>(&format!(
                r#"
                INSERT INTO orders (patient_id, prescription_id, date, status, total_amount, deposit_amount, notes)
                VALUES ($1, $2, COALESCE($3, now()), $4, $5, $6, $7)
                RETURNING {ORDER_COLUMNS}
                "#
            ))
            .bind(&order.patient_id)
            .bind(order.prescription_id)
            .bind(order.date)
            .bind(order.status.as_str())
            .bind(order.total_amount)
            .bind(order.deposit_amount)
            .bind(&order.notes)
            .fetch_one(&mut *tx)
            .await
            .map_err(insert_error)?;

            for line in &lines {
                // FOR SHARE keeps the product from being deleted under us.
                let price: Decimal =
                    sqlx::query_scalar("SELECT price FROM products WHERE id = $1 FOR SHARE")
                        .bind(line.product_id)
                        .fetch_optional(&mut *tx)
                        .await?
                        .ok_or(StorageError::ProductNotFound(line.product_id))?;

                sqlx::query(
                    r#"
                    INSERT INTO order_items (order_id, product_id, quantity, price)
                    VALUES ($1, $2, $3, $4)
                    "#,
                )
                .bind(created.id)
                .bind(line.product_id)
                .bind(line.quantity)
                .bind(price)
                .execute(&mut *tx)
                .await
                .map_err(insert_error)?;
            }

            tx.commit().await?;
            Ok(created)
        })
    }

    fn get_order_items(
        &self,
        order_id: i32,
    ) -> BoxFuture<'_, StorageResult<Vec<OrderItemWithProduct>>> {
        traced("get_order_items", async move {
            let items = sqlx::query_as::<_, OrderItemWithProduct>(
                r#"
                SELECT oi.id AS item_id, oi.order_id, oi.product_id, oi.quantity, oi.price AS item_price,
                       p.id, p.name, p.description, p.category, p.brand, p.model, p.price,
                       p.stock, p.image_url, p.active, p.created_at
                FROM order_items oi
                INNER JOIN products p ON oi.product_id = p.id
                WHERE oi.order_id = $1
                ORDER BY oi.id
                "#,
            )
            .bind(order_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(items)
        })
    }

    fn get_user_role(&self, user_id: String) -> BoxFuture<'_, StorageResult<Option<UserRole>>> {
        traced("get_user_role", async move {
            let role = sqlx::query_as::<_, UserRole>(&format!(
                "SELECT {USER_ROLE_COLUMNS} FROM user_roles WHERE user_id = $1"
            ))
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(role)
        })
    }

    fn set_user_role(&self, role: NewUserRole) -> BoxFuture<'_, StorageResult<UserRole>> {
        traced("set_user_role", async move {
            let stored = sqlx::query_as::<_, UserRole>(&format!(
                r#"
                INSERT INTO user_roles (user_id, role, rut, phone, address, birth_date)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (user_id) DO UPDATE
                SET role = EXCLUDED.role,
                    rut = EXCLUDED.rut,
                    phone = EXCLUDED.phone,
                    address = EXCLUDED.address,
                    birth_date = EXCLUDED.birth_date
                RETURNING {USER_ROLE_COLUMNS}
                "#
            ))
            .bind(&role.user_id)
            .bind(role.role.as_str())
            .bind(&role.rut)
            .bind(&role.phone)
            .bind(&role.address)
            .bind(role.birth_date)
            .fetch_one(&self.pool)
            .await
            .map_err(insert_error)?;
            Ok(stored)
        })
    }

    fn list_users(&self) -> BoxFuture<'_, StorageResult<Vec<UserWithRole>>> {
        traced("list_users", async move {
            let users = sqlx::query_as::<_, UserWithRole>(
                r#"
                SELECT u.id, u.email, u.first_name, u.last_name, u.profile_image_url, u.created_at, r.role
                FROM users u
                LEFT JOIN user_roles r ON r.user_id = u.id
                ORDER BY u.created_at
                "#,
            )
            .fetch_all(&self.pool)
            .await?;
            Ok(users)
        })
    }

    fn get_user(&self, user_id: String) -> BoxFuture<'_, StorageResult<Option<User>>> {
        traced("get_user", async move {
            let user = sqlx::query_as::<_, User>(&format!(
                "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
            ))
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(user)
        })
    }

    fn upsert_user(&self, user: NewUser) -> BoxFuture<'_, StorageResult<User>> {
        traced("upsert_user", async move {
            let password_hash = user
                .password_hash
                .as_ref()
                .map(|hash| hash.expose_secret().clone());
            let stored = sqlx::query_as::<_, User>(&format!(
                r#"
                INSERT INTO users (id, email, first_name, last_name, profile_image_url, password_hash)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (id) DO UPDATE
                SET email = EXCLUDED.email,
                    first_name = EXCLUDED.first_name,
                    last_name = EXCLUDED.last_name,
                    profile_image_url = EXCLUDED.profile_image_url,
                    password_hash = COALESCE(EXCLUDED.password_hash, users.password_hash)
                RETURNING {USER_COLUMNS}
                "#
            ))
            .bind(&user.id)
            .bind(&user.email)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(&user.profile_image_url)
            .bind(password_hash)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                if is_violation(&e, UNIQUE_VIOLATION).is_some() {
                    StorageError::Conflict(format!(
                        "Email {} is already registered",
                        user.email.as_deref().unwrap_or_default()
                    ))
                } else {
                    StorageError::Database(e)
                }
            })?;
            Ok(stored)
        })
    }

    fn get_stored_credentials(
        &self,
        email: String,
    ) -> BoxFuture<'_, StorageResult<Option<(String, Secret<String>)>>> {
        traced("get_stored_credentials", async move {
            let row = sqlx::query(
                r#"
                SELECT id, password_hash FROM users
                WHERE email = $1 AND password_hash IS NOT NULL
                "#,
            )
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
            let credentials = match row {
                Some(row) => {
                    let id: String = row.try_get("id")?;
                    let hash: String = row.try_get("password_hash")?;
                    Some((id, Secret::new(hash)))
                }
                None => None,
            };
            Ok(credentials)
        })
    }
}
