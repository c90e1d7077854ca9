/*
[INPUT]:  Submodule definitions
[OUTPUT]: Public type exports
[POS]:    Data layer - module wiring
[UPDATE]: When adding new type modules
*/

pub mod enums;
pub mod models;
pub mod requests;

pub use enums::{OrderStatus, PositionSide, Side};
pub use models::{MarketConfig, OrderSnapshot, PositionUpdate, Quote};
pub use requests::{OrdersHistoryRequest, PlaceOrderAck, PlaceOrderRequest};
