pub mod backup;
pub mod cache;
pub mod mock;
pub mod overrides;
pub mod primary;
pub mod provider;
pub mod resolver;

pub use backup::BackupProvider;
pub use cache::QuoteCache;
pub use mock::MockProvider;
pub use primary::PrimaryProvider;
pub use provider::{ProviderQuote, QuoteError, QuoteProvider};
pub use resolver::{QuoteResolver, ResolveOptions, ResolverConfig};
