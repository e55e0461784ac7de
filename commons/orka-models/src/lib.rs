pub mod cloud;
pub mod cluster;
pub mod enums;
pub mod progress;
pub mod quota;
pub mod request;
pub mod validation;

pub use cloud::*;
pub use cluster::*;
pub use enums::*;
pub use progress::*;
pub use quota::*;
pub use request::*;
pub use validation::*;
