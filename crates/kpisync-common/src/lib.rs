pub mod a1;
pub mod column;
pub mod value;

pub use a1::*;
pub use column::*;
pub use value::*;
