pub mod bootstrap;
pub mod events;
pub mod identity;
pub mod ingest;
pub mod maintainer;
pub mod member_engine;
pub mod member_sets;
pub mod query;
pub mod roles;
pub mod state;
pub mod view;
