pub mod bearer;
pub mod validation;

pub use bearer::BearerToken;
pub use validation::ValidatedJson;
