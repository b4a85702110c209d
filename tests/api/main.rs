mod appointments;
mod dashboard;
mod health_check;
mod login;
mod orders;
mod postgres;
mod users;
