// Thin namespace wrapper for API-layer components
pub mod handlers {
    pub use crate::handlers::*;
}

pub mod jobs {
    pub use crate::jobs::*;
}

pub mod report {
    pub use crate::report::*;
}
