// Domain-layer modules and shared errors/models
pub mod batch {
    pub use crate::batch::*;
}

pub mod cpf {
    pub use crate::cpf::*;
}

pub mod lookup {
    pub use crate::lookup::*;
}

pub mod models {
    pub use crate::models::*;
}

pub mod errors {
    pub use crate::errors::*;
}
