pub mod activity;
pub mod config;
pub mod duty;
pub mod roster;

pub use activity::{Activity, ActivityKind};
pub use config::{Config, MapConfig};
pub use duty::{Duty, DutyPatch, DutyStatus, DutyType, NewDuty};
pub use roster::{Officer, Vehicle};
