//! # Repository Module
//!
//! Database repository implementations for Vela POS.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern                                    │
//! │                                                                         │
//! │  Checkout engine                                                        │
//! │       │                                                                 │
//! │       │  db.products().get_by_id(id)                                    │
//! │       ▼                                                                 │
//! │  ProductRepository ── SQL ──► SQLite                                    │
//! │                                                                         │
//! │  Two access shapes per repository:                                      │
//! │  • `&self` methods on the repo struct - pool-backed reads and           │
//! │    standalone writes                                                    │
//! │  • free-standing `*_tx` functions taking `&mut SqliteConnection` -      │
//! │    writes that must join the sale commit transaction                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`product::ProductRepository`] - Product lookups, guarded stock decrements,
//!   variant cascade
//! - [`sale::SaleRepository`] - Sale + line item persistence
//! - [`movement::MovementRepository`] - Append-only stock movement log
//! - [`account::AccountRepository`] - Customer accounts and guarded debits
//! - [`alert::AlertRepository`] - Low-stock alert upserts

pub mod account;
pub mod alert;
pub mod movement;
pub mod product;
pub mod sale;
