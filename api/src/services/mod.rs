pub mod prices;
pub mod telegram;

pub use prices::{
    CachedPriceSource, CoinMarketCapPriceSource, FallbackPriceSource, StaticPriceSource,
};
pub use telegram::TelegramNotifier;
