pub mod file_validation;
pub mod format;
pub mod jwks;
pub mod keycloak;
pub mod request;
pub mod s3;
