//! Schema migrations for the kickroll tables.

pub use sea_orm_migration::prelude::*;

mod m20241019_000001_create_tables;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    // Keep our bookkeeping apart from any host application's migrations
    fn migration_table_name() -> sea_orm::DynIden {
        Alias::new("kickroll_store_migrations").into_iden()
    }

    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(m20241019_000001_create_tables::Migration)]
    }
}
