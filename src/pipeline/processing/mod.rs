// Cleaning stages, in the order the orchestrator runs them

pub mod fields;
pub mod non_crime;
pub mod address;
pub mod coercion;
pub mod temporal;
pub mod report_number;
pub mod fuzzy;
pub mod hierarchy;
pub mod geo;
