pub mod money;
pub mod order;
pub mod product;

pub use money::*;
pub use order::*;
pub use product::*;
