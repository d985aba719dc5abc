//! External service integrations.

pub mod work_api {
    pub use crate::services::*;
}
