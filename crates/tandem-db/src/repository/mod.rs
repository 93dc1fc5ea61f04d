//! # Repository Module
//!
//! One repository per table family. Each holds a cloned `SqlitePool`, so
//! handing one to a task is cheap.
//!
//! ## Store Split
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  System A (source, read-mostly)     System B (mirror, engine writes)    │
//! │                                                                         │
//! │  SourceAgentRepository              MirrorAgentRepository               │
//! │  ProductRepository                  StockBinRepository                  │
//! │  AllocationRepository               AppliedAllocationRepository         │
//! │                                     EnforcementRepository               │
//! │                                     ComplianceActionRepository          │
//! │                                     AlertRepository                     │
//! │                                     SyncJobRepository                   │
//! │                                     FailedJobRepository                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod alert;
pub mod allocation;
pub mod compliance;
pub mod enforcement;
pub mod failed_job;
pub mod mirror_agent;
pub mod product;
pub mod source_agent;
pub mod stock_bin;
pub mod sync_job;
