//! Shared wire types for the crowdplay widget: the cross-frame event
//! schema, the hub protocol, vote models, and the error taxonomy.

pub mod error;
pub mod models;

pub use error::*;
pub use models::*;
