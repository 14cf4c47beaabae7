pub mod config;
pub mod fetcher;
pub mod headers;

pub use config::ClientConfig;
pub use fetcher::ApiFetcher;
