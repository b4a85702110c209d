use chrono::Utc;
use futures::future::BoxFuture;
use secrecy::{ExposeSecret, Secret};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{traced, Storage, StorageError, StorageResult};
use crate::models::{
    Appointment, AppointmentUpdate, NewAppointment, NewOrder, NewPrescription, NewProduct,
    NewUser, NewUserRole, Order, OrderItem, OrderItemWithProduct, OrderLine, Prescription,
    Product, ProductUpdate, User, UserRole, UserWithRole,
};

/// Process-local store with the same guarantees as the Postgres one.
///
/// Every operation holds a single lock over all tables, so a multi-row write
/// is never observed half done.
#[derive(Default)]
pub struct InMemoryStorage {
    tables: Mutex<Tables>,
}

#[derive(Default)]
struct Tables {
    products: BTreeMap<i32, Product>,
    appointments: BTreeMap<i32, Appointment>,
    prescriptions: BTreeMap<i32, Prescription>,
    orders: BTreeMap<i32, Order>,
    order_items: BTreeMap<i32, OrderItem>,
    user_roles: BTreeMap<String, UserRole>,
    users: BTreeMap<String, StoredUser>,
    sequence: Sequences,
}

struct StoredUser {
    user: User,
    password_hash: Option<String>,
}

#[derive(Default)]
struct Sequences {
    product: i32,
    appointment: i32,
    prescription: i32,
    order: i32,
    order_item: i32,
    user_role: i32,
}

fn next(counter: &mut i32) -> i32 {
    *counter += 1;
    *counter
}

impl Tables {
    fn require_user(&self, user_id: &str, field: &'static str) -> StorageResult<()> {
        if self.users.contains_key(user_id) {
            Ok(())
        } else {
            Err(StorageError::MissingReference(field))
        }
    }

    fn create_order(&mut self, order: NewOrder, lines: Vec<OrderLine>) -> StorageResult<Order> {
        self.require_user(&order.patient_id, "patientId")?;
        if let Some(prescription_id) = order.prescription_id {
            if !self.prescriptions.contains_key(&prescription_id) {
                return Err(StorageError::MissingReference("prescriptionId"));
            }
        }
        // Resolve every price before the first write.
        let priced = lines
            .iter()
            .map(|line| {
                self.products
                    .get(&line.product_id)
                    .map(|product| (*line, product.price))
                    .ok_or(StorageError::ProductNotFound(line.product_id))
            })
            .collect::<StorageResult<Vec<_>>>()?;

        let now = Utc::now();
        let created = Order {
            id: next(&mut self.sequence.order),
            patient_id: order.patient_id,
            prescription_id: order.prescription_id,
            date: order.date.unwrap_or(now),
            status: order.status,
            total_amount: order.total_amount,
            deposit_amount: order.deposit_amount,
            notes: order.notes,
            created_at: now,
        };
        for (line, price) in priced {
            let id = next(&mut self.sequence.order_item);
            self.order_items.insert(
                id,
                OrderItem {
                    id,
                    order_id: created.id,
                    product_id: line.product_id,
                    quantity: line.quantity,
                    price,
                },
            );
        }
        self.orders.insert(created.id, created.clone());
        Ok(created)
    }
}

fn newest_first<T>(mut rows: Vec<T>, date: impl Fn(&T) -> chrono::DateTime<Utc>) -> Vec<T> {
    rows.sort_by_key(|row| std::cmp::Reverse(date(row)));
    rows
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_tables<'a, T, F>(&'a self, operation: &'static str, f: F) -> BoxFuture<'a, StorageResult<T>>
    where
        F: FnOnce(&mut Tables) -> StorageResult<T> + Send + 'a,
        T: Send + 'a,
    {
        traced(operation, async move { f(&mut *self.tables()) })
    }
}

impl Storage for InMemoryStorage {
    fn list_products(&self, active_only: bool) -> BoxFuture<'_, StorageResult<Vec<Product>>> {
        self.with_tables("list_products", move |t| {
            Ok(t.products
                .values()
                .filter(|p| !active_only || p.active)
                .cloned()
                .collect())
        })
    }

    fn get_product(&self, id: i32) -> BoxFuture<'_, StorageResult<Option<Product>>> {
        self.with_tables("get_product", move |t| Ok(t.products.get(&id).cloned()))
    }

    fn create_product(&self, product: NewProduct) -> BoxFuture<'_, StorageResult<Product>> {
        self.with_tables("create_product", move |t| {
            let created = Product {
                id: next(&mut t.sequence.product),
                name: product.name,
                description: product.description,
                category: product.category,
                brand: product.brand,
                model: product.model,
                price: product.price,
                stock: product.stock,
                image_url: product.image_url,
                active: product.active,
                created_at: Utc::now(),
            };
            t.products.insert(created.id, created.clone());
            Ok(created)
        })
    }

    fn update_product(
        &self,
        id: i32,
        update: ProductUpdate,
    ) -> BoxFuture<'_, StorageResult<Option<Product>>> {
        self.with_tables("update_product", move |t| {
            Ok(t.products.get_mut(&id).map(|product| {
                update.apply(product);
                product.clone()
            }))
        })
    }

    fn delete_product(&self, id: i32) -> BoxFuture<'_, StorageResult<bool>> {
        self.with_tables("delete_product", move |t| {
            if t.order_items.values().any(|item| item.product_id == id) {
                return Err(StorageError::Conflict(format!(
                    "Product {id} is referenced by existing order items"
                )));
            }
            Ok(t.products.remove(&id).is_some())
        })
    }

    fn list_appointments(
        &self,
        patient_id: Option<String>,
    ) -> BoxFuture<'_, StorageResult<Vec<Appointment>>> {
        self.with_tables("list_appointments", move |t| {
            let rows = t
                .appointments
                .values()
                .filter(|a| patient_id.as_deref().map_or(true, |p| a.patient_id == p))
                .cloned()
                .collect();
            Ok(newest_first(rows, |a: &Appointment| a.date))
        })
    }

    fn get_appointment(&self, id: i32) -> BoxFuture<'_, StorageResult<Option<Appointment>>> {
        self.with_tables("get_appointment", move |t| {
            Ok(t.appointments.get(&id).cloned())
        })
    }

    fn create_appointment(
        &self,
        appointment: NewAppointment,
    ) -> BoxFuture<'_, StorageResult<Appointment>> {
        self.with_tables("create_appointment", move |t| {
            t.require_user(&appointment.patient_id, "patientId")?;
            let created = Appointment {
                id: next(&mut t.sequence.appointment),
                patient_id: appointment.patient_id,
                doctor_name: appointment.doctor_name,
                date: appointment.date,
                reason: appointment.reason,
                status: appointment.status,
                notes: appointment.notes,
                created_at: Utc::now(),
            };
            t.appointments.insert(created.id, created.clone());
            Ok(created)
        })
    }

    fn update_appointment(
        &self,
        id: i32,
        update: AppointmentUpdate,
    ) -> BoxFuture<'_, StorageResult<Option<Appointment>>> {
        self.with_tables("update_appointment", move |t| {
            Ok(t.appointments.get_mut(&id).map(|appointment| {
                update.apply(appointment);
                appointment.clone()
            }))
        })
    }

    fn list_prescriptions(
        &self,
        patient_id: Option<String>,
    ) -> BoxFuture<'_, StorageResult<Vec<Prescription>>> {
        self.with_tables("list_prescriptions", move |t| {
            let rows = t
                .prescriptions
                .values()
                .filter(|p| patient_id.as_deref().map_or(true, |id| p.patient_id == id))
                .cloned()
                .collect();
            Ok(newest_first(rows, |p: &Prescription| p.date))
        })
    }

    fn get_prescription(&self, id: i32) -> BoxFuture<'_, StorageResult<Option<Prescription>>> {
        self.with_tables("get_prescription", move |t| {
            Ok(t.prescriptions.get(&id).cloned())
        })
    }

    fn create_prescription(
        &self,
        prescription: NewPrescription,
    ) -> BoxFuture<'_, StorageResult<Prescription>> {
        self.with_tables("create_prescription", move |t| {
            t.require_user(&prescription.patient_id, "patientId")?;
            let now = Utc::now();
            let created = Prescription {
                id: next(&mut t.sequence.prescription),
                patient_id: prescription.patient_id,
                date: prescription.date.unwrap_or(now),
                doctor_name: prescription.doctor_name,
                right_eye: prescription.right_eye,
                left_eye: prescription.left_eye,
                addition: prescription.addition,
                pupillary_distance: prescription.pupillary_distance,
                diagnosis: prescription.diagnosis,
                notes: prescription.notes,
                is_transcription: prescription.is_transcription,
                original_image_url: prescription.original_image_url,
                created_at: now,
            };
            t.prescriptions.insert(created.id, created.clone());
            Ok(created)
        })
    }

    fn list_orders(&self, patient_id: Option<String>) -> BoxFuture<'_, StorageResult<Vec<Order>>> {
        self.with_tables("list_orders", move |t| {
            let rows = t
                .orders
                .values()
                .filter(|o| patient_id.as_deref().map_or(true, |p| o.patient_id == p))
                .cloned()
                .collect();
            Ok(newest_first(rows, |o: &Order| o.date))
        })
    }

    fn get_order(&self, id: i32) -> BoxFuture<'_, StorageResult<Option<Order>>> {
        self.with_tables("get_order", move |t| Ok(t.orders.get(&id).cloned()))
    }

    fn create_order(
        &self,
        order: NewOrder,
        lines: Vec<OrderLine>,
    ) -> BoxFuture<'_, StorageResult<Order>> {
        self.with_tables("create_order", move |t| t.create_order(order, lines))
    }

    fn get_order_items(
        &self,
        order_id: i32,
    ) -> BoxFuture<'_, StorageResult<Vec<OrderItemWithProduct>>> {
        self.with_tables("get_order_items", move |t| {
            Ok(t.order_items
                .values()
                .filter(|item| item.order_id == order_id)
                .filter_map(|item| {
                    t.products.get(&item.product_id).map(|product| OrderItemWithProduct {
                        item: item.clone(),
                        product: product.clone(),
                    })
                })
                .collect())
        })
    }

    fn get_user_role(&self, user_id: String) -> BoxFuture<'_, StorageResult<Option<UserRole>>> {
        self.with_tables("get_user_role", move |t| {
            Ok(t.user_roles.get(&user_id).cloned())
        })
    }

    fn set_user_role(&self, role: NewUserRole) -> BoxFuture<'_, StorageResult<UserRole>> {
        self.with_tables("set_user_role", move |t| {
            t.require_user(&role.user_id, "userId")?;
            let id = match t.user_roles.get(&role.user_id) {
                Some(existing) => existing.id,
                None => next(&mut t.sequence.user_role),
            };
            let stored = UserRole {
                id,
                user_id: role.user_id,
                role: role.role,
                rut: role.rut,
                phone: role.phone,
                address: role.address,
                birth_date: role.birth_date,
            };
            t.user_roles.insert(stored.user_id.clone(), stored.clone());
            Ok(stored)
        })
    }

    fn list_users(&self) -> BoxFuture<'_, StorageResult<Vec<UserWithRole>>> {
        self.with_tables("list_users", move |t| {
            let mut users: Vec<UserWithRole> = t
                .users
                .values()
                .map(|stored| UserWithRole {
                    user: stored.user.clone(),
                    role: t.user_roles.get(&stored.user.id).map(|r| r.role),
                })
                .collect();
            users.sort_by_key(|u| u.user.created_at);
            Ok(users)
        })
    }

    fn get_user(&self, user_id: String) -> BoxFuture<'_, StorageResult<Option<User>>> {
        self.with_tables("get_user", move |t| {
            Ok(t.users.get(&user_id).map(|stored| stored.user.clone()))
        })
    }

    fn upsert_user(&self, user: NewUser) -> BoxFuture<'_, StorageResult<User>> {
        self.with_tables("upsert_user", move |t| {
            let password_hash = user
                .password_hash
                .as_ref()
                .map(|hash| hash.expose_secret().clone());
            if let Some(email) = &user.email {
                let taken = t
                    .users
                    .values()
                    .any(|s| s.user.id != user.id && s.user.email.as_ref() == Some(email));
                if taken {
                    return Err(StorageError::Conflict(format!(
                        "Email {email} is already registered"
                    )));
                }
            }
            let stored = t.users.entry(user.id.clone()).or_insert_with(|| StoredUser {
                user: User {
                    id: user.id.clone(),
                    email: None,
                    first_name: None,
                    last_name: None,
                    profile_image_url: None,
                    created_at: Utc::now(),
                },
                password_hash: None,
            });
            stored.user.email = user.email;
            stored.user.first_name = user.first_name;
            stored.user.last_name = user.last_name;
            stored.user.profile_image_url = user.profile_image_url;
            if password_hash.is_some() {
                stored.password_hash = password_hash;
            }
            Ok(stored.user.clone())
        })
    }

    fn get_stored_credentials(
        &self,
        email: String,
    ) -> BoxFuture<'_, StorageResult<Option<(String, Secret<String>)>>> {
        self.with_tables("get_stored_credentials", move |t| {
            Ok(t.users.values().find_map(|stored| {
                match (&stored.user.email, &stored.password_hash) {
                    (Some(e), Some(hash)) if *e == email => {
                        Some((stored.user.id.clone(), Secret::new(hash.clone())))
                    }
                    _ => None,
                }
            }))
        })
    }
}
