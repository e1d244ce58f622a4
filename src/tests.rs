#[macro_use]
mod support;

mod fake_keycloak;
