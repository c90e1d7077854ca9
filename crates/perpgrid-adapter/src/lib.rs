/*
[INPUT]:  Crate modules and public type definitions
[OUTPUT]: Public adapter-contract crate surface
[POS]:    Crate root - module wiring
[UPDATE]: When public modules or exports change
*/

pub mod contract;
pub mod error;
pub mod sim;
pub mod types;

// Re-export the contract surface
pub use contract::{
    AccountSubscription,
    Capabilities,
    ExchangeAdapter,
    OrderUpdateCallback,
    OrderbookSubscription,
    PositionUpdateCallback,
    QuoteCallback,
    Unsubscribe,
};

// Re-export errors
pub use error::{
    AdapterError,
    Result,
};

// Re-export all types
pub use types::*;

pub use sim::SimAdapter;
