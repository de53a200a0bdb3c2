pub mod assembler;
pub mod comparators;
pub mod conditions;
pub mod configs;
pub mod crds;
pub mod env_names;
pub mod error;
pub mod formatters;
pub mod images;
pub mod labels;
pub mod models;
pub mod quantity;
