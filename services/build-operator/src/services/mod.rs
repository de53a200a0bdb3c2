pub mod build_service;
pub mod controller;
pub mod resource_manager;
pub mod store;
