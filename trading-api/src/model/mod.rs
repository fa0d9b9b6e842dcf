pub mod depth;
pub mod events;
pub mod ids;
pub mod instrument;
pub mod order;
pub mod position;
pub mod quote;

pub use depth::*;
pub use events::*;
pub use ids::*;
pub use instrument::*;
pub use order::*;
pub use position::*;
pub use quote::*;
