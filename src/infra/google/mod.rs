pub mod drive_client;
pub mod gcs_client;
pub mod service_account;

pub use drive_client::DriveClient;
pub use gcs_client::GcsClient;
pub use service_account::{GoogleAuth, GoogleError};
