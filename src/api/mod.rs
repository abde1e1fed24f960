// Admin HTTP surface (C11): read-only views over C8's caches.

pub mod admin;

pub use admin::{create_admin_router, AdminAppState};
