pub mod config;
pub mod config_loader;
pub mod events;
pub mod limits;
pub mod portfolio;
pub mod risk;
pub mod traits;

pub use config::AppConfig;
pub use config_loader::ConfigLoader;
pub use events::{Side, Signal, TradeAction, TradeRecord};
pub use limits::RiskLimits;
pub use portfolio::{Portfolio, PortfolioError, PortfolioSnapshot, Position, RiskStatus};
pub use risk::{position_size, validate_trade, Decision, TradeCandidate};
pub use traits::{
    AccountInfo, ExchangeConnector, OrderRequest, OrderResult, OrderStatus, StopLossRequest,
    Strategy,
};
