//! Database entity models for kickroll-store.
//!
//! These Sea-ORM entities define the tables behind the enrollment engine, the
//! credit ledger and the audit trail. Status and type columns are stored as
//! short strings through [`DeriveActiveEnum`](sea_orm::DeriveActiveEnum)
//! enums so that the persisted values match the API vocabulary.

/// Scheduled class sessions and their denormalized `enrolled_count`.
pub mod class_session;

/// One row per `(session, member)` enrollment; never hard-deleted.
pub mod enrollment;

/// Members that own plans.
pub mod member;

/// Credit packs and time passes owned by a member.
pub mod member_plan;

/// Append-only audit log.
pub mod audit_log;
