pub mod https;
pub mod observability;

pub use https::{hsts, https_redirect};
pub use observability::{request_observability, REQUEST_ID_HEADER};
