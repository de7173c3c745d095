//! Domain types for the strategy execution core

pub mod bar;
pub mod ids;
pub mod intent;
pub mod order;
pub mod position;

pub use bar::{timeframe_duration, BarEvent, RawBar, SourceKey};
pub use ids::{ConfigHash, IdGen, OrderId};
pub use intent::{Bias, TradeIntent};
pub use order::{OrderPurpose, OrderRequest, OrderSide, OrderType};
pub use position::{Position, PositionSide, VOLUME_EPSILON};
