//! Data models for menugen-ai (Menu Ingest microservice)
//!
//! - Menu lifecycle state machine
//! - Section / dish records
//! - Structured extraction draft
//! - Failure taxonomy

pub mod dish;
pub mod draft;
pub mod failure;
pub mod menu;

pub use dish::{Dish, DishStatus, Section};
pub use draft::{DishDraft, DraftError, MenuDraft, SectionDraft};
pub use failure::FailureCode;
pub use menu::{Menu, MenuStatus};
