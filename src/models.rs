pub mod breadcrumb;
pub mod document;
pub mod keycloak;
pub mod login_log;
pub mod note;
pub mod pagination;
pub mod user;
