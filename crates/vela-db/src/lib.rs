//! # vela-db: Database Layer for Vela POS
//!
//! This crate provides primary-store access for the Vela POS sale-completion
//! core. It uses SQLite for local storage with sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Vela POS Data Flow                               │
//! │                                                                         │
//! │  Checkout pipeline (vela-checkout)                                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐    │
//! │  │                     vela-db (THIS CRATE)                        │    │
//! │  │                                                                 │    │
//! │  │   ┌───────────────┐    ┌────────────────┐    ┌──────────────┐  │    │
//! │  │   │   Database    │    │  Repositories  │    │  Migrations  │  │    │
//! │  │   │   (pool.rs)   │    │ product, sale, │    │  (embedded)  │  │    │
//! │  │   │               │    │ movement,      │    │              │  │    │
//! │  │   │ SqlitePool    │◄───│ account, alert │    │ 001_init.sql │  │    │
//! │  │   │ Transactions  │    │                │    │              │  │    │
//! │  │   └───────────────┘    └────────────────┘    └──────────────┘  │    │
//! │  │                                                                 │    │
//! │  └─────────────────────────────────────────────────────────────────┘    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite database (primary store; the mirror is a second handle)         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use vela_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("path/to/vela.db")).await?;
//! let product = db.products().get_by_sku("ABC-S1").await?;
//!
//! // Writes that must join the commit transaction use *_tx functions:
//! let mut tx = db.begin().await?;
//! vela_db::repository::sale::insert_sale_tx(&mut tx, &sale).await?;
//! tx.commit().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::account::AccountRepository;
pub use repository::alert::AlertRepository;
pub use repository::movement::MovementRepository;
pub use repository::product::ProductRepository;
pub use repository::sale::SaleRepository;
