//! CLI command implementations.
//!
//! | Module | Handles                                   |
//! |--------|-------------------------------------------|
//! | `run`  | `enroll <GROUP> <ROSTER>`, the whole run  |

pub mod run;

pub use run::run_enrollment;
