pub mod claude;
pub mod util;

pub use claude::Claude;
