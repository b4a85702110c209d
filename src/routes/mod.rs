mod appointments;
mod dashboard;
mod error;
mod health_check;
mod login;
mod orders;
mod prescriptions;
mod products;
mod users;

pub use appointments::*;
pub use dashboard::*;
pub use error::*;
pub use health_check::*;
pub use login::*;
pub use orders::*;
pub use prescriptions::*;
pub use products::*;
pub use users::*;
