//! SeaORM migrations for the partflow schema
//!
//! Migrations are database-agnostic and run on SQLite (tests) and
//! PostgreSQL (production).

use sea_orm_migration::prelude::*;

pub mod m20260810_000001_initial_schema;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(m20260810_000001_initial_schema::Migration)]
    }
}
