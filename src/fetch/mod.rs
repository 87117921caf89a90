mod direct;
mod fallback;
mod fetcher;
pub mod robots;

pub use direct::DirectFetcher;
pub use fallback::{FallbackClient, FallbackFetch};
pub use fetcher::FetchStep;
pub use robots::RobotsPolicy;
