//! Domain vocabulary for the lab booking service.
//!
//! Everything in here is free of I/O: the booking service feeds these rules
//! with rows loaded from its store and acts on the answers.

mod admission;
mod analytics;
mod availability;
mod notification;
mod reservation;

pub use admission::*;
pub use analytics::*;
pub use availability::*;
pub use notification::*;
pub use reservation::*;
