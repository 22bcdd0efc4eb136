mod common;
mod vehicle_store_tests;
