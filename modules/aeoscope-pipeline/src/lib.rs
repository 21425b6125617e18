pub mod classifier;
pub mod fetcher;
pub mod pipeline;
pub mod scorer;

pub use classifier::{build_url_records, BucketModel, ClaudeBucketModel, UrlClassifier};
pub use fetcher::{ProviderError, RateLimiter, ResultFetcher, SearchProvider};
pub use pipeline::VisibilityPipeline;
pub use scorer::score;
