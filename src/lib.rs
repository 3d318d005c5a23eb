pub mod error;
pub mod filter;
pub mod logging;
pub mod table;

pub use error::{IndexError, InvalidPatternError, ParseError, SaveError};
pub use filter::{CompiledFilter, FilterView, SortDir};
pub use table::{LINE_ENDING, ModelEvent, SubscriptionId, TableModel};
