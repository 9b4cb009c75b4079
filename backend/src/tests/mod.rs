pub mod common;

mod user_service_test;
